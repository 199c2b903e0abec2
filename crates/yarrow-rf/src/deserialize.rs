//! Model reader: tokenizer and record builders for the text format
//! written by [`crate::serialize`].

use std::io::Read;
use std::str::FromStr;

use tracing::{debug, info};

use crate::config::RfParameters;
use crate::dataset::Dataset;
use crate::error::RfError;
use crate::forest::Forest;
use crate::node::Node;
use crate::split::{MaxInfoGainSingleSplit, MaxInfoGainSplit, SplitSelector};
use crate::tree::Tree;

/// One classified token from the stream.
#[derive(Debug)]
struct Token {
    /// One-based position in the stream, for error reporting.
    index: usize,
    /// The alphabetic field tag preceding the value, if any.
    tag: Option<String>,
    payload: Payload,
}

#[derive(Debug)]
enum Payload {
    Scalar(String),
    EmptyArray,
    NumericArray { len: usize, values: String },
    ObjectArray { len: usize },
    ObjectStart(String),
    ObjectEnd(String),
}

fn is_alpha(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphabetic())
}

fn is_numeric_array(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'e' | b','))
}

/// `[k]` for a non-negative integer `k`.
fn parse_array_size(s: &str) -> Option<usize> {
    let inner = s.strip_prefix('[')?.strip_suffix(']')?;
    if inner.is_empty() || !inner.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    inner.parse().ok()
}

/// Whitespace tokenizer with a one-token pushback buffer.
struct Tokenizer<'s> {
    words: std::str::SplitWhitespace<'s>,
    pushed: Option<&'s str>,
    count: usize,
}

impl<'s> Tokenizer<'s> {
    fn new(text: &'s str) -> Self {
        Self {
            words: text.split_whitespace(),
            pushed: None,
            count: 0,
        }
    }

    fn read(&mut self) -> Option<&'s str> {
        if let Some(word) = self.pushed.take() {
            return Some(word);
        }
        let word = self.words.next();
        if word.is_some() {
            self.count += 1;
        }
        word
    }

    fn truncated(&self) -> RfError {
        RfError::Parse {
            token_index: self.count,
            token: String::new(),
            reason: "unexpected end of stream".to_string(),
        }
    }

    /// Read and classify the next token. An alphabetic word is consumed
    /// as the field tag of whatever follows it.
    fn next(&mut self) -> Result<Token, RfError> {
        let mut word = self.read().ok_or_else(|| self.truncated())?;

        let mut tag = None;
        if is_alpha(word) {
            tag = Some(word.to_string());
            word = self.read().ok_or_else(|| self.truncated())?;
        }

        let payload = if let Some(name) = word.strip_suffix('{').filter(|n| is_alpha(n)) {
            Payload::ObjectStart(name.to_string())
        } else if let Some(name) = word.strip_prefix('}').filter(|n| is_alpha(n)) {
            Payload::ObjectEnd(name.to_string())
        } else if let Some(len) = parse_array_size(word) {
            if len == 0 {
                Payload::EmptyArray
            } else {
                let next = self.read().ok_or_else(|| self.truncated())?;
                if next.strip_suffix('{').is_some_and(is_alpha) {
                    // The array holds records; hand the opener back.
                    self.pushed = Some(next);
                    Payload::ObjectArray { len }
                } else if is_numeric_array(next) {
                    Payload::NumericArray {
                        len,
                        values: next.to_string(),
                    }
                } else {
                    return Err(RfError::Parse {
                        token_index: self.count,
                        token: next.to_string(),
                        reason: "unknown array element type".to_string(),
                    });
                }
            }
        } else {
            Payload::Scalar(word.to_string())
        };

        Ok(Token {
            index: self.count,
            tag,
            payload,
        })
    }
}

impl<'a> Forest<'a> {
    /// Load a forest from `stream` and rebind it to `data`.
    ///
    /// The model file stores only an empty dataset placeholder, so the
    /// caller must supply the dataset again; prediction and evaluation
    /// are available immediately on the returned forest.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::Io`] | reading `stream` failed |
    /// | [`RfError::Parse`] | malformed token stream |
    pub fn load(stream: &mut dyn Read, data: &'a dyn Dataset) -> Result<Forest<'a>, RfError> {
        let mut text = String::new();
        stream.read_to_string(&mut text)?;

        let mut builder = ForestBuilder::new(&text);
        builder.expect_record("RFforest")?;
        let mut forest: Forest<'a> = builder.forest_body()?;
        forest.set_dataset(data);
        info!(num_trees = forest.num_trees(), "model loaded");
        Ok(forest)
    }
}

/// Record builders: one handler per record class, each consuming
/// (tag, typed value) pairs until its matching ObjectEnd. Unknown pairs
/// are fatal.
struct ForestBuilder<'s> {
    tok: Tokenizer<'s>,
}

impl<'s> ForestBuilder<'s> {
    fn new(text: &'s str) -> Self {
        Self {
            tok: Tokenizer::new(text),
        }
    }

    fn unexpected(&self, index: usize, tag: Option<&str>, payload: &Payload, record: &str) -> RfError {
        RfError::Parse {
            token_index: index,
            token: tag.unwrap_or_default().to_string(),
            reason: format!("unexpected token in {record}: {payload:?}"),
        }
    }

    fn missing(&self, record: &str, field: &str) -> RfError {
        RfError::Parse {
            token_index: self.tok.count,
            token: String::new(),
            reason: format!("missing field {field} in {record}"),
        }
    }

    /// Consume the next token and require it to open the named record.
    fn expect_record(&mut self, record: &'static str) -> Result<(), RfError> {
        let Token {
            index,
            tag,
            payload,
        } = self.tok.next()?;
        match payload {
            Payload::ObjectStart(ref name) if name == record => Ok(()),
            other => Err(self.unexpected(index, tag.as_deref(), &other, record)),
        }
    }

    fn scalar<T: FromStr>(&self, index: usize, value: &str) -> Result<T, RfError> {
        value.parse().map_err(|_| RfError::Parse {
            token_index: index,
            token: value.to_string(),
            reason: "scalar does not parse".to_string(),
        })
    }

    fn numeric_array<T: FromStr>(
        &self,
        index: usize,
        len: usize,
        values: &str,
    ) -> Result<Vec<T>, RfError> {
        let parsed: Vec<T> = values
            .split(',')
            .map(|v| self.scalar(index, v))
            .collect::<Result<_, _>>()?;
        if parsed.len() != len {
            return Err(RfError::Parse {
                token_index: index,
                token: values.to_string(),
                reason: format!("array declared {len} elements, found {}", parsed.len()),
            });
        }
        Ok(parsed)
    }

    fn boolean(&self, index: usize, value: &str) -> Result<bool, RfError> {
        match value {
            "1" => Ok(true),
            "0" => Ok(false),
            _ => Err(RfError::Parse {
                token_index: index,
                token: value.to_string(),
                reason: "boolean must be 0 or 1".to_string(),
            }),
        }
    }

    /// Body of an `RFforest` record, opener already consumed.
    fn forest_body(&mut self) -> Result<Forest<'static>, RfError> {
        let mut params: Option<RfParameters> = None;
        let mut trees: Vec<Tree<'static>> = Vec::new();

        loop {
            let Token {
                index,
                tag,
                payload,
            } = self.tok.next()?;
            match (tag.as_deref(), payload) {
                (_, Payload::ObjectEnd(ref name)) if name == "RFforest" => break,
                (Some("data"), Payload::EmptyArray) => {}
                (Some("params"), Payload::ObjectStart(ref name)) if name == "RFparameters" => {
                    params = Some(self.parameters_body()?);
                }
                (Some("trees"), Payload::ObjectArray { len }) => {
                    trees.reserve(len);
                    for _ in 0..len {
                        self.expect_record("RFtree")?;
                        trees.push(self.tree_body()?);
                    }
                    debug!(num_trees = trees.len(), "read tree array");
                }
                (tag, ref payload) => {
                    return Err(self.unexpected(index, tag, payload, "RFforest"));
                }
            }
        }

        let params = params.ok_or_else(|| self.missing("RFforest", "params"))?;
        Ok(Forest::from_raw(params, trees))
    }

    /// Body of an `RFparameters` record, opener already consumed.
    fn parameters_body(&mut self) -> Result<RfParameters, RfError> {
        let mut num_trees = None;
        let mut num_split_features = None;
        let mut min_score = None;

        loop {
            let Token {
                index,
                tag,
                payload,
            } = self.tok.next()?;
            match (tag.as_deref(), payload) {
                (_, Payload::ObjectEnd(ref name)) if name == "RFparameters" => break,
                (Some("numTrees"), Payload::Scalar(ref v)) => {
                    num_trees = Some(self.scalar(index, v)?);
                }
                (Some("numSplitFeatures"), Payload::Scalar(ref v)) => {
                    num_split_features = Some(self.scalar(index, v)?);
                }
                (Some("minScore"), Payload::Scalar(ref v)) => {
                    min_score = Some(self.scalar(index, v)?);
                }
                (tag, ref payload) => {
                    return Err(self.unexpected(index, tag, payload, "RFparameters"));
                }
            }
        }

        Ok(RfParameters::from_raw(
            num_trees.ok_or_else(|| self.missing("RFparameters", "numTrees"))?,
            num_split_features.ok_or_else(|| self.missing("RFparameters", "numSplitFeatures"))?,
            min_score.ok_or_else(|| self.missing("RFparameters", "minScore"))?,
        ))
    }

    /// Body of an `RFtree` record, opener already consumed.
    fn tree_body(&mut self) -> Result<Tree<'static>, RfError> {
        let mut params: Option<RfParameters> = None;
        let mut ids = Vec::new();
        let mut bag = Vec::new();
        let mut oob = Vec::new();
        let mut root: Option<Node> = None;

        loop {
            let Token {
                index,
                tag,
                payload,
            } = self.tok.next()?;
            match (tag.as_deref(), payload) {
                (_, Payload::ObjectEnd(ref name)) if name == "RFtree" => break,
                (Some("data"), Payload::EmptyArray) => {}
                (Some("ids"), Payload::NumericArray { len, ref values }) => {
                    ids = self.numeric_array(index, len, values)?;
                }
                (Some("ids"), Payload::EmptyArray) => ids = Vec::new(),
                (Some("bag"), Payload::NumericArray { len, ref values }) => {
                    bag = self.numeric_array(index, len, values)?;
                }
                (Some("bag"), Payload::EmptyArray) => bag = Vec::new(),
                (Some("oob"), Payload::NumericArray { len, ref values }) => {
                    oob = self.numeric_array(index, len, values)?;
                }
                (Some("oob"), Payload::EmptyArray) => oob = Vec::new(),
                (Some("params"), Payload::ObjectStart(ref name)) if name == "RFparameters" => {
                    params = Some(self.parameters_body()?);
                }
                (Some("root"), Payload::ObjectStart(ref name)) if name == "RFnode" => {
                    root = Some(self.node_body()?);
                }
                (tag, ref payload) => {
                    return Err(self.unexpected(index, tag, payload, "RFtree"));
                }
            }
        }

        Ok(Tree::from_raw(
            params.ok_or_else(|| self.missing("RFtree", "params"))?,
            ids,
            bag,
            oob,
            root.ok_or_else(|| self.missing("RFtree", "root"))?,
        ))
    }

    /// Body of an `RFnode` record, opener already consumed.
    fn node_body(&mut self) -> Result<Node, RfError> {
        let mut counts: Option<Vec<f64>> = None;
        let mut n: Option<usize> = None;
        let mut depth: Option<usize> = None;
        let mut split: Option<Box<dyn SplitSelector>> = None;
        let mut left: Option<Box<Node>> = None;
        let mut right: Option<Box<Node>> = None;

        loop {
            let Token {
                index,
                tag,
                payload,
            } = self.tok.next()?;
            match (tag.as_deref(), payload) {
                (_, Payload::ObjectEnd(ref name)) if name == "RFnode" => break,
                (Some("counts"), Payload::NumericArray { len, ref values }) => {
                    counts = Some(self.numeric_array(index, len, values)?);
                }
                (Some("n"), Payload::Scalar(ref v)) => n = Some(self.scalar(index, v)?),
                (Some("depth"), Payload::Scalar(ref v)) => depth = Some(self.scalar(index, v)?),
                (Some("split"), Payload::ObjectStart(ref name)) => {
                    split = Some(self.split_selector_body(index, name)?);
                }
                (Some("Left"), Payload::ObjectStart(ref name)) if name == "RFnode" => {
                    left = Some(Box::new(self.node_body()?));
                }
                (Some("Right"), Payload::ObjectStart(ref name)) if name == "RFnode" => {
                    right = Some(Box::new(self.node_body()?));
                }
                (tag, ref payload) => {
                    return Err(self.unexpected(index, tag, payload, "RFnode"));
                }
            }
        }

        Ok(Node::from_raw(
            counts.ok_or_else(|| self.missing("RFnode", "counts"))?,
            n.ok_or_else(|| self.missing("RFnode", "n"))?,
            depth.ok_or_else(|| self.missing("RFnode", "depth"))?,
            split.ok_or_else(|| self.missing("RFnode", "split"))?,
            left,
            right,
        ))
    }

    /// Dispatch on the record-type tag; alternative selector kinds slot in
    /// here without touching the node reader.
    fn split_selector_body(
        &mut self,
        index: usize,
        record: &str,
    ) -> Result<Box<dyn SplitSelector>, RfError> {
        match record {
            "MaxInfoGainSplit" => Ok(Box::new(self.max_info_gain_split_body()?)),
            other => Err(RfError::Parse {
                token_index: index,
                token: other.to_string(),
                reason: "unknown split selector record".to_string(),
            }),
        }
    }

    /// Body of a `MaxInfoGainSplit` record, opener already consumed.
    fn max_info_gain_split_body(&mut self) -> Result<MaxInfoGainSplit, RfError> {
        let mut counts: Option<Vec<f64>> = None;
        let mut got_split = false;
        let mut best: Option<usize> = None;
        let mut splits = Vec::new();

        loop {
            let Token {
                index,
                tag,
                payload,
            } = self.tok.next()?;
            match (tag.as_deref(), payload) {
                (_, Payload::ObjectEnd(ref name)) if name == "MaxInfoGainSplit" => break,
                (Some("counts"), Payload::NumericArray { len, ref values }) => {
                    counts = Some(self.numeric_array(index, len, values)?);
                }
                (Some("gotSplit"), Payload::Scalar(ref v)) => {
                    got_split = self.boolean(index, v)?;
                }
                (Some("bestft"), Payload::Scalar(ref v)) => {
                    let raw: i64 = self.scalar(index, v)?;
                    best = usize::try_from(raw).ok();
                }
                (Some("split"), Payload::EmptyArray) => splits = Vec::new(),
                (Some("split"), Payload::ObjectArray { len }) => {
                    splits.reserve(len);
                    for _ in 0..len {
                        self.expect_record("MaxInfoGainSingleSplit")?;
                        splits.push(self.single_split_body()?);
                    }
                }
                (tag, ref payload) => {
                    return Err(self.unexpected(index, tag, payload, "MaxInfoGainSplit"));
                }
            }
        }

        if let Some(b) = best
            && b >= splits.len()
        {
            return Err(RfError::Parse {
                token_index: self.tok.count,
                token: b.to_string(),
                reason: "bestft out of range".to_string(),
            });
        }

        Ok(MaxInfoGainSplit::from_raw(
            counts.ok_or_else(|| self.missing("MaxInfoGainSplit", "counts"))?,
            got_split,
            best,
            splits,
        ))
    }

    /// Body of a `MaxInfoGainSingleSplit` record, opener already consumed.
    fn single_split_body(&mut self) -> Result<MaxInfoGainSingleSplit, RfError> {
        let mut ids = Vec::new();
        let mut ftid: Option<u32> = None;
        let mut perm = Vec::new();
        let mut counts = Vec::new();
        let mut ig: Option<Vec<f64>> = None;
        let mut splitpos: Option<usize> = None;
        let mut splitval: Option<f64> = None;

        loop {
            let Token {
                index,
                tag,
                payload,
            } = self.tok.next()?;
            match (tag.as_deref(), payload) {
                (_, Payload::ObjectEnd(ref name)) if name == "MaxInfoGainSingleSplit" => break,
                (Some("ids"), Payload::NumericArray { len, ref values }) => {
                    ids = self.numeric_array(index, len, values)?;
                }
                (Some("ftid"), Payload::Scalar(ref v)) => ftid = Some(self.scalar(index, v)?),
                (Some("perm"), Payload::NumericArray { len, ref values }) => {
                    perm = self.numeric_array(index, len, values)?;
                }
                (Some("counts"), Payload::NumericArray { len, ref values }) => {
                    counts = self.numeric_array(index, len, values)?;
                }
                (Some("ig"), Payload::NumericArray { len, ref values }) => {
                    ig = Some(self.numeric_array(index, len, values)?);
                }
                (Some("splitpos"), Payload::Scalar(ref v)) => {
                    splitpos = Some(self.scalar(index, v)?);
                }
                (Some("splitval"), Payload::Scalar(ref v)) => {
                    splitval = Some(self.scalar(index, v)?);
                }
                (tag, ref payload) => {
                    return Err(self.unexpected(index, tag, payload, "MaxInfoGainSingleSplit"));
                }
            }
        }

        let ig = ig.ok_or_else(|| self.missing("MaxInfoGainSingleSplit", "ig"))?;
        let splitpos =
            splitpos.ok_or_else(|| self.missing("MaxInfoGainSingleSplit", "splitpos"))?;
        if splitpos >= ig.len() {
            return Err(RfError::Parse {
                token_index: self.tok.count,
                token: splitpos.to_string(),
                reason: "splitpos out of range".to_string(),
            });
        }

        Ok(MaxInfoGainSingleSplit::from_raw(
            ids,
            ftid.ok_or_else(|| self.missing("MaxInfoGainSingleSplit", "ftid"))?,
            perm,
            counts,
            ig,
            splitpos,
            splitval.ok_or_else(|| self.missing("MaxInfoGainSingleSplit", "splitval"))?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::RfParameters;
    use crate::dataset::Dataset;
    use crate::error::RfError;
    use crate::forest::{Forest, train};
    use crate::testutil::three_class_data;

    fn saved_model() -> (crate::dataset::MatrixDataset, Vec<u8>) {
        let data = three_class_data(15, 6);
        let params = RfParameters::new(3)
            .unwrap()
            .with_num_split_features(2)
            .with_min_score(1e-6);
        let forest = train(&data, params, 25).unwrap();
        let mut out = Vec::new();
        forest.save(&mut out).unwrap();
        (data, out)
    }

    #[test]
    fn round_trip_preserves_predictions_exactly() {
        let (data, model) = saved_model();
        let params = RfParameters::new(3)
            .unwrap()
            .with_num_split_features(2)
            .with_min_score(1e-6);
        let original = train(&data, params, 25).unwrap();

        let loaded = Forest::load(&mut model.as_slice(), &data).unwrap();
        assert_eq!(loaded.num_trees(), original.num_trees());

        for id in data.ids() {
            let sample = data.sample(id).unwrap();
            let before = original.predict(&sample).unwrap();
            let after = loaded.predict(&sample).unwrap();
            let before_bits: Vec<u64> = before.iter().map(|p| p.to_bits()).collect();
            let after_bits: Vec<u64> = after.iter().map(|p| p.to_bits()).collect();
            assert_eq!(before_bits, after_bits, "sample {id}");
        }
    }

    #[test]
    fn round_trip_preserves_bag_and_oob() {
        let (data, model) = saved_model();
        let params = RfParameters::new(3)
            .unwrap()
            .with_num_split_features(2)
            .with_min_score(1e-6);
        let original = train(&data, params, 25).unwrap();
        let loaded = Forest::load(&mut model.as_slice(), &data).unwrap();

        for n in 0..original.num_trees() {
            assert_eq!(original.tree(n).unwrap().bag(), loaded.tree(n).unwrap().bag());
            assert_eq!(original.tree(n).unwrap().oob(), loaded.tree(n).unwrap().oob());
            assert_eq!(original.tree(n).unwrap().ids(), loaded.tree(n).unwrap().ids());
        }
        assert_eq!(original.params(), loaded.params());
    }

    #[test]
    fn resaving_a_loaded_model_is_identical() {
        let (data, model) = saved_model();
        let loaded = Forest::load(&mut model.as_slice(), &data).unwrap();

        let mut resaved = Vec::new();
        loaded.save(&mut resaved).unwrap();
        assert_eq!(model, resaved);
    }

    #[test]
    fn loaded_forest_supports_oob_and_importance() {
        use rand::SeedableRng;

        let (data, model) = saved_model();
        let loaded = Forest::load(&mut model.as_slice(), &data).unwrap();

        let (err, _) = loaded.oob_errors().unwrap();
        assert_eq!(err.len(), data.num_classes());

        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(3);
        let (imp, _) = loaded.var_imp(&mut rng).unwrap();
        assert_eq!(imp.len(), data.num_features());
    }

    #[test]
    fn truncated_stream_is_a_parse_error() {
        let (data, model) = saved_model();
        let text = String::from_utf8(model).unwrap();
        let truncated = &text[..text.len() / 2];

        let err = Forest::load(&mut truncated.as_bytes(), &data).unwrap_err();
        assert!(matches!(err, RfError::Parse { .. }));
    }

    #[test]
    fn mismatched_object_end_is_a_parse_error() {
        let (data, model) = saved_model();
        let text = String::from_utf8(model).unwrap();
        let corrupted = text.replacen("}RFparameters", "}RFnode", 1);

        let err = Forest::load(&mut corrupted.as_bytes(), &data).unwrap_err();
        assert!(matches!(err, RfError::Parse { .. }));
    }

    #[test]
    fn unknown_tag_is_a_parse_error() {
        let (data, model) = saved_model();
        let text = String::from_utf8(model).unwrap();
        let corrupted = text.replacen("numTrees", "numTress", 1);

        let err = Forest::load(&mut corrupted.as_bytes(), &data).unwrap_err();
        match err {
            RfError::Parse { token_index, .. } => assert!(token_index > 0),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_split_selector_is_a_parse_error() {
        let (data, model) = saved_model();
        let text = String::from_utf8(model).unwrap();
        let corrupted = text
            .replace("MaxInfoGainSplit{", "MedianSplit{")
            .replace("}MaxInfoGainSplit", "}MedianSplit");

        let err = Forest::load(&mut corrupted.as_bytes(), &data).unwrap_err();
        assert!(matches!(err, RfError::Parse { .. }));
    }

    #[test]
    fn unknown_array_element_type_is_a_parse_error() {
        let data = three_class_data(5, 1);
        let text = "RFforest{ data [0] params RFparameters{ numTrees 1 \
                    numSplitFeatures 1 minScore 0 }RFparameters trees [1] ??? }RFforest";
        let err = Forest::load(&mut text.as_bytes(), &data).unwrap_err();
        assert!(matches!(err, RfError::Parse { .. }));
    }

    #[test]
    fn array_length_mismatch_is_a_parse_error() {
        let (data, model) = saved_model();
        let text = String::from_utf8(model).unwrap();
        // Declare one more element than the ids array carries.
        let start = text.find("ids [").unwrap();
        let end = start + text[start..].find(']').unwrap();
        let declared: usize = text[start + 5..end].parse().unwrap();
        let corrupted = format!(
            "{}ids [{}]{}",
            &text[..start],
            declared + 1,
            &text[end + 1..]
        );

        let err = Forest::load(&mut corrupted.as_bytes(), &data).unwrap_err();
        assert!(matches!(err, RfError::Parse { .. }));
    }
}
