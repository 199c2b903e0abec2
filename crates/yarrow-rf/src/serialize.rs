//! Model writer: a self-describing, whitespace-delimited text format.
//!
//! Records open with `Name{` and close with `}Name`; every field is
//! preceded by an alphabetic tag. Arrays carry their length up front
//! (`[k] v0,v1,…`), a zero-length array is just `[0]`, and object arrays
//! list their `[k]` records after the marker. Floats are written in
//! scientific notation with seventeen significand digits so reloading a
//! model reproduces every prediction exactly.

use std::io::{self, Write};

use tracing::info;

use crate::config::RfParameters;
use crate::error::RfError;
use crate::forest::Forest;
use crate::node::Node;
use crate::split::{MaxInfoGainSingleSplit, MaxInfoGainSplit};
use crate::tree::Tree;

/// Render a float for the model file.
///
/// One digit before the point and sixteen after, `max_digits10` for an
/// `f64`, so parsing the text recovers the exact bit pattern; NaN (an
/// absent split value) parses back through `f64::from_str`.
pub(crate) fn fmt_ftval(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else {
        format!("{value:.16e}")
    }
}

/// Indented line-oriented writer for tagged records.
pub struct TextWriter<'a> {
    out: &'a mut dyn Write,
    depth: usize,
}

impl<'a> TextWriter<'a> {
    pub(crate) fn new(out: &'a mut dyn Write) -> Self {
        Self { out, depth: 0 }
    }

    fn indent(&mut self) -> io::Result<()> {
        for _ in 0..self.depth {
            self.out.write_all(b"  ")?;
        }
        Ok(())
    }

    /// Open a record: `Name{`.
    pub fn begin(&mut self, name: &str) -> io::Result<()> {
        self.indent()?;
        writeln!(self.out, "{name}{{")?;
        self.depth += 1;
        Ok(())
    }

    /// Close a record: `}Name`.
    pub fn end(&mut self, name: &str) -> io::Result<()> {
        self.depth -= 1;
        self.indent()?;
        writeln!(self.out, "}}{name}")
    }

    /// A tag alone on its line, introducing a nested record.
    pub fn tag(&mut self, tag: &str) -> io::Result<()> {
        self.indent()?;
        writeln!(self.out, "{tag}")
    }

    /// A tagged scalar field.
    pub fn scalar(&mut self, tag: &str, value: impl std::fmt::Display) -> io::Result<()> {
        self.indent()?;
        writeln!(self.out, "{tag} {value}")
    }

    /// A tagged float field in round-trip-exact notation.
    pub fn float(&mut self, tag: &str, value: f64) -> io::Result<()> {
        self.indent()?;
        writeln!(self.out, "{tag} {}", fmt_ftval(value))
    }

    /// A tagged integer array: `tag [k] v0,v1,…` (just `[0]` when empty).
    pub fn uint_array(&mut self, tag: &str, values: &[u32]) -> io::Result<()> {
        self.indent()?;
        write!(self.out, "{tag} [{}]", values.len())?;
        for (i, v) in values.iter().enumerate() {
            let sep = if i == 0 { ' ' } else { ',' };
            write!(self.out, "{sep}{v}")?;
        }
        writeln!(self.out)
    }

    /// A tagged float array in round-trip-exact notation.
    pub fn float_array(&mut self, tag: &str, values: &[f64]) -> io::Result<()> {
        self.indent()?;
        write!(self.out, "{tag} [{}]", values.len())?;
        for (i, v) in values.iter().enumerate() {
            let sep = if i == 0 { ' ' } else { ',' };
            write!(self.out, "{sep}{}", fmt_ftval(*v))?;
        }
        writeln!(self.out)
    }

    /// A tagged empty-array placeholder: `tag [0]`.
    pub fn empty_array(&mut self, tag: &str) -> io::Result<()> {
        self.indent()?;
        writeln!(self.out, "{tag} [0]")
    }

    /// An object-array marker: `tag [k]`, followed by `k` records.
    pub fn array_header(&mut self, tag: &str, len: usize) -> io::Result<()> {
        self.indent()?;
        writeln!(self.out, "{tag} [{len}]")
    }
}

impl Forest<'_> {
    /// Serialize the forest to `out`.
    ///
    /// The referenced dataset is written as an empty placeholder
    /// (`data [0]`); [`Forest::load`](crate::forest::Forest::load) takes
    /// a dataset to rebind.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::Io`] when the underlying stream fails.
    pub fn save(&self, out: &mut dyn Write) -> Result<(), RfError> {
        let mut buf = io::BufWriter::new(out);
        let mut w = TextWriter::new(&mut buf);
        self.write_record(&mut w)?;
        buf.flush()?;
        info!(num_trees = self.num_trees(), "model saved");
        Ok(())
    }

    pub(crate) fn write_record(&self, w: &mut TextWriter<'_>) -> io::Result<()> {
        w.begin("RFforest")?;
        w.empty_array("data")?;
        w.tag("params")?;
        self.params().write_record(w)?;
        w.array_header("trees", self.num_trees())?;
        for tree in self.trees() {
            tree.write_record(w)?;
        }
        w.end("RFforest")
    }
}

impl RfParameters {
    pub(crate) fn write_record(&self, w: &mut TextWriter<'_>) -> io::Result<()> {
        w.begin("RFparameters")?;
        w.scalar("numTrees", self.num_trees())?;
        w.scalar("numSplitFeatures", self.num_split_features())?;
        w.float("minScore", self.min_score())?;
        w.end("RFparameters")
    }
}

impl Tree<'_> {
    pub(crate) fn write_record(&self, w: &mut TextWriter<'_>) -> io::Result<()> {
        w.begin("RFtree")?;
        w.empty_array("data")?;
        w.uint_array("ids", self.ids())?;
        w.uint_array("bag", self.bag())?;
        w.uint_array("oob", self.oob())?;
        w.tag("params")?;
        self.params().write_record(w)?;
        w.tag("root")?;
        self.root().write_record(w)?;
        w.end("RFtree")
    }
}

impl Node {
    pub(crate) fn write_record(&self, w: &mut TextWriter<'_>) -> io::Result<()> {
        w.begin("RFnode")?;
        w.float_array("counts", &self.counts)?;
        w.scalar("n", self.n)?;
        w.scalar("depth", self.depth)?;
        w.tag("split")?;
        self.split.write(w)?;
        if let Some(left) = self.left() {
            w.tag("Left")?;
            left.write_record(w)?;
        }
        if let Some(right) = self.right() {
            w.tag("Right")?;
            right.write_record(w)?;
        }
        w.end("RFnode")
    }
}

impl MaxInfoGainSplit {
    pub(crate) fn write_record(&self, w: &mut TextWriter<'_>) -> io::Result<()> {
        w.begin("MaxInfoGainSplit")?;
        w.float_array("counts", &self.counts)?;
        w.scalar("gotSplit", u8::from(self.got_split))?;
        let bestft: i64 = self.best.map_or(-1, |i| i as i64);
        w.scalar("bestft", bestft)?;
        w.array_header("split", self.splits.len())?;
        for split in &self.splits {
            split.write_record(w)?;
        }
        w.end("MaxInfoGainSplit")
    }
}

impl MaxInfoGainSingleSplit {
    pub(crate) fn write_record(&self, w: &mut TextWriter<'_>) -> io::Result<()> {
        w.begin("MaxInfoGainSingleSplit")?;
        w.uint_array("ids", &self.ids)?;
        w.scalar("ftid", self.ftid)?;
        w.uint_array("perm", &self.perm)?;
        w.float_array("counts", &self.counts)?;
        w.float_array("ig", &self.ig)?;
        w.scalar("splitpos", self.splitpos)?;
        w.float("splitval", self.splitval)?;
        w.end("MaxInfoGainSingleSplit")
    }
}
