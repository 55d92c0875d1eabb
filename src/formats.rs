//! Support for reading and writing text formats.
//!
//! ### Newick (reading and writing)
//!
//! The phylogenetic tree is persisted as a Newick string.
//! Every node must be named, and node names are quoted with single quotes when necessary.
//! Branch lengths are written for all nodes except the root.
//!
//! * [`parse_newick`]: Parse a Newick string into a list of nodes in preorder.
//! * [`write_newick`]: Write a [`TreeIndex`] as a Newick string.
//!
//! ### Wiggle (writing)
//!
//! Depth tracks are written in the fixedStep wiggle format.
//! See [`WiggleTrack`].

use crate::{HalError, Result, TreeIndex};

use std::io::{self, Write};

#[cfg(test)]
mod tests;

//-----------------------------------------------------------------------------

/// A node parsed from a Newick string.
#[derive(Clone, Debug, PartialEq)]
pub struct NewickNode {
    /// Name of the node.
    pub name: String,
    /// Position of the parent in the list of parsed nodes, or [`None`] for the root.
    pub parent: Option<usize>,
    /// Length of the branch to the parent (`0.0` if not given).
    pub branch_length: f64,
}

// Characters that end an unquoted label or a branch length.
const DELIMITERS: &[u8] = b"()[]':;,";

fn is_delimiter(byte: u8) -> bool {
    DELIMITERS.contains(&byte) || byte.is_ascii_whitespace()
}

struct NewickParser<'a> {
    bytes: &'a [u8],
    offset: usize,
    nodes: Vec<NewickNode>,
}

impl<'a> NewickParser<'a> {
    fn error(&self, message: &str) -> HalError {
        HalError::invalid(format!("Newick: {} at offset {}", message, self.offset))
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.offset).copied()
    }

    // Skips whitespace and comments in square brackets.
    fn skip(&mut self) -> Result<()> {
        while let Some(byte) = self.peek() {
            if byte.is_ascii_whitespace() {
                self.offset += 1;
            } else if byte == b'[' {
                match self.bytes[self.offset..].iter().position(|x| *x == b']') {
                    Some(len) => self.offset += len + 1,
                    None => return Err(self.error("unterminated comment")),
                }
            } else {
                break;
            }
        }
        Ok(())
    }

    fn label(&mut self) -> Result<String> {
        let mut result: Vec<u8> = Vec::new();
        if self.peek() == Some(b'\'') {
            self.offset += 1;
            loop {
                match self.peek() {
                    Some(b'\'') => {
                        self.offset += 1;
                        if self.peek() == Some(b'\'') {
                            result.push(b'\'');
                            self.offset += 1;
                        } else {
                            break;
                        }
                    },
                    Some(byte) => {
                        result.push(byte);
                        self.offset += 1;
                    },
                    None => return Err(self.error("unterminated quoted label")),
                }
            }
        } else {
            while let Some(byte) = self.peek() {
                if is_delimiter(byte) {
                    break;
                }
                result.push(byte);
                self.offset += 1;
            }
        }
        String::from_utf8(result).map_err(|_| self.error("label is not valid UTF-8"))
    }

    fn number(&mut self) -> Result<f64> {
        let start = self.offset;
        while let Some(byte) = self.peek() {
            if is_delimiter(byte) {
                break;
            }
            self.offset += 1;
        }
        let value = String::from_utf8_lossy(&self.bytes[start..self.offset]);
        value.parse::<f64>().map_err(|_| self.error(&format!("invalid branch length {}", value)))
    }

    // Reads the label and the branch length of a node.
    fn finish_node(&mut self, id: usize) -> Result<()> {
        let name = self.label()?;
        if name.is_empty() {
            return Err(self.error("unnamed node"));
        }
        self.nodes[id].name = name;
        self.skip()?;
        if self.peek() == Some(b':') {
            self.offset += 1;
            self.skip()?;
            self.nodes[id].branch_length = self.number()?;
            self.skip()?;
        }
        Ok(())
    }

    // Parses the tree with an explicit stack of internal nodes with unfinished child lists.
    fn tree(&mut self) -> Result<()> {
        let mut open: Vec<usize> = Vec::new();
        loop {
            self.skip()?;
            let id = self.nodes.len();
            self.nodes.push(NewickNode { name: String::new(), parent: open.last().copied(), branch_length: 0.0 });
            if self.peek() == Some(b'(') {
                self.offset += 1;
                open.push(id);
                continue;
            }

            // Finish the node and every internal node closed after it.
            let mut current = id;
            loop {
                self.finish_node(current)?;
                let parent = match open.last() {
                    Some(parent) => *parent,
                    None => return Ok(()),
                };
                match self.peek() {
                    Some(b',') => {
                        self.offset += 1;
                        break;
                    },
                    Some(b')') => {
                        self.offset += 1;
                        self.skip()?;
                        open.pop();
                        current = parent;
                    },
                    _ => return Err(self.error("expected ',' or ')'")),
                }
            }
        }
    }
}

/// Parses a Newick string and returns the nodes in preorder.
///
/// Each parent precedes its children in the list, and children are listed in order.
/// An empty string or a string containing only whitespace yields an empty list.
/// The terminating semicolon is optional.
///
/// # Errors
///
/// Returns [`HalError::InvalidArgument`] if the string cannot be parsed or a node is unnamed.
///
/// # Examples
///
/// ```
/// use hal_base::formats;
///
/// let nodes = formats::parse_newick("(B:1,'C d':2.5)A;").unwrap();
/// assert_eq!(nodes.len(), 3);
/// assert_eq!(nodes[0].name, "A");
/// assert_eq!(nodes[2].name, "C d");
/// assert_eq!(nodes[2].parent, Some(0));
/// assert_eq!(nodes[2].branch_length, 2.5);
/// ```
pub fn parse_newick(newick: &str) -> Result<Vec<NewickNode>> {
    let mut parser = NewickParser { bytes: newick.as_bytes(), offset: 0, nodes: Vec::new() };
    parser.skip()?;
    if parser.peek().is_none() {
        return Ok(Vec::new());
    }
    parser.tree()?;
    if parser.peek() == Some(b';') {
        parser.offset += 1;
        parser.skip()?;
    }
    if parser.peek().is_some() {
        return Err(parser.error("unexpected trailing characters"));
    }
    Ok(parser.nodes)
}

//-----------------------------------------------------------------------------

fn append_label(buffer: &mut String, label: &str) {
    let needs_quotes = label.bytes().any(is_delimiter);
    if needs_quotes {
        buffer.push('\'');
        buffer.push_str(&label.replace('\'', "''"));
        buffer.push('\'');
    } else {
        buffer.push_str(label);
    }
}

// Writes the subtree using an explicit stack of (node, next child) pairs.
fn append_subtree(buffer: &mut String, tree: &TreeIndex, root: usize) {
    let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
    while let Some((id, next)) = stack.pop() {
        let node = tree.node(id);
        if next < node.children().len() {
            buffer.push(if next == 0 { '(' } else { ',' });
            stack.push((id, next + 1));
            stack.push((node.children()[next], 0));
            continue;
        }
        if !node.is_leaf() {
            buffer.push(')');
        }
        append_label(buffer, node.name());
        if node.parent().is_some() {
            buffer.push(':');
            buffer.push_str(&node.branch_length().to_string());
        }
    }
}

/// Returns the Newick representation of the tree with a terminating semicolon.
///
/// Returns an empty string for an empty tree.
pub fn write_newick(tree: &TreeIndex) -> String {
    let mut buffer = String::new();
    if let Some(root) = tree.root() {
        append_subtree(&mut buffer, tree, root);
        buffer.push(';');
    }
    buffer
}

//-----------------------------------------------------------------------------

/// A fixedStep wiggle track written to a stream.
///
/// Each call to [`WiggleTrack::start`] writes a header line for a new sequence.
/// Coordinates passed to it are 0-based; the header uses 1-based coordinates.
///
/// # Examples
///
/// ```
/// use hal_base::formats::WiggleTrack;
///
/// let mut track = WiggleTrack::new(Vec::new());
/// track.start("chr1", 10, 2).unwrap();
/// track.push(3).unwrap();
/// track.push(0).unwrap();
/// let output = String::from_utf8(track.into_inner()).unwrap();
/// assert_eq!(output, "fixedStep chrom=chr1 start=11 step=2\n3\n0\n");
/// ```
#[derive(Debug)]
pub struct WiggleTrack<W: Write> {
    writer: W,
    values: usize,
}

impl<W: Write> WiggleTrack<W> {
    /// Creates a new track writing to the given stream.
    pub fn new(writer: W) -> Self {
        WiggleTrack { writer, values: 0 }
    }

    /// Starts a new block of values for the sequence, beginning at 0-based offset `start`.
    pub fn start(&mut self, sequence: &str, start: usize, step: usize) -> io::Result<()> {
        writeln!(self.writer, "fixedStep chrom={} start={} step={}", sequence, start + 1, step)
    }

    /// Writes the next value.
    pub fn push(&mut self, value: usize) -> io::Result<()> {
        self.values += 1;
        writeln!(self.writer, "{}", value)
    }

    /// Returns the total number of values written.
    pub fn values(&self) -> usize {
        self.values
    }

    /// Flushes the underlying stream.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Returns the underlying stream.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

//-----------------------------------------------------------------------------
