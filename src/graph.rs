//! Topology loader
//
// https://github.com/rust-iot/rust-loosemac
// Copyright 2021 Ryan Kurte
//
// Input grammar, one node per line after the header:
//
//   <num_nodes> [ <lambda> ]
//   <id> ( <deg> ) <n1> .. <n_deg> [ <s1> <s2> .. ]
//
// `#` opens a comment to end of line, whitespace is free-form, and the
// bracket characters are literal tokens (glued forms like `(2)` or `[1 3]`
// are accepted).

use std::collections::BTreeSet;

use log::debug;

use crate::config::Config;
use crate::error::Error;
use crate::NodeId;

/// One declared node: id, one-hop adjacency and slot preferences
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    pub id: NodeId,
    pub neighbors: Vec<NodeId>,
    pub default_slots: Vec<u32>,
}

/// A validated input topology
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graph {
    lambda: u32,
    specs: Vec<NodeSpec>,
}

impl Graph {
    /// Validate a topology assembled in code
    ///
    /// Checks the frame length, duplicate ids and adjacency closure, and
    /// wraps default-slot preferences into [1, lambda].
    pub fn new(lambda: u32, specs: Vec<NodeSpec>) -> Result<Self, Error> {
        if lambda < 1 {
            return Err(Error::InvalidLambda(lambda));
        }
        if specs.is_empty() {
            return Err(Error::InvalidNodeCount(0));
        }

        let mut ids = BTreeSet::new();
        for spec in &specs {
            if !ids.insert(spec.id) {
                return Err(Error::DuplicateNode { node: spec.id });
            }
        }

        for spec in &specs {
            for n in &spec.neighbors {
                if !ids.contains(n) {
                    return Err(Error::UnknownNeighbor {
                        node: spec.id,
                        neighbor: *n,
                    });
                }
            }
            for s in &spec.default_slots {
                if *s < 1 {
                    return Err(Error::InvalidDefaultSlot {
                        node: spec.id,
                        slot: *s,
                    });
                }
            }
        }

        let config = Config::new(lambda);
        let specs = specs
            .into_iter()
            .map(|mut spec| {
                spec.default_slots = spec
                    .default_slots
                    .iter()
                    .map(|s| config.wrap_slot(*s))
                    .collect();
                spec
            })
            .collect();

        Ok(Self { lambda, specs })
    }

    /// Parse the plain-text topology format
    pub fn parse(input: &str) -> Result<Self, Error> {
        let mut header: Option<(u32, Option<u32>)> = None;
        let mut specs: Vec<NodeSpec> = Vec::new();
        let mut last_line = 0;

        for (i, raw) in input.lines().enumerate() {
            let line = i + 1;
            last_line = line;

            let text = match raw.split('#').next() {
                Some(t) => t,
                None => "",
            };
            if text.trim().is_empty() {
                continue;
            }

            match header {
                None => {
                    header = Some(parse_header(line, text)?);
                }
                Some((num_nodes, _)) => {
                    if specs.len() == num_nodes as usize {
                        // More node lines than the header declared
                        return Err(Error::MalformedInput { line });
                    }
                    specs.push(parse_node_line(line, text)?);
                }
            }
        }

        let (num_nodes, lambda) = match header {
            Some(h) => h,
            None => return Err(Error::MalformedInput { line: last_line + 1 }),
        };

        if num_nodes < 1 {
            return Err(Error::InvalidNodeCount(num_nodes));
        }
        if specs.len() != num_nodes as usize {
            return Err(Error::MalformedInput { line: last_line + 1 });
        }

        let lambda = match lambda {
            Some(l) => l,
            None => num_nodes,
        };

        debug!(
            "Loaded topology: {} nodes, lambda {}",
            num_nodes, lambda
        );

        Self::new(lambda, specs)
    }

    pub fn lambda(&self) -> u32 {
        self.lambda
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Declared nodes in declaration order
    pub fn nodes(&self) -> &[NodeSpec] {
        &self.specs
    }
}

/// `<num_nodes> [ <lambda> ]`
fn parse_header(line: usize, text: &str) -> Result<(u32, Option<u32>), Error> {
    let padded = pad(text);
    let mut t = Tokens::new(&padded, line);

    let num_nodes = t.next_u32()?;

    let lambda = if t.is_done() {
        None
    } else {
        t.expect("[")?;
        let l = t.next_u32()?;
        t.expect("]")?;
        Some(l)
    };

    t.done()?;

    Ok((num_nodes, lambda))
}

/// `<id> ( <deg> ) <n1> .. <n_deg> [ <s1> <s2> .. ]`
fn parse_node_line(line: usize, text: &str) -> Result<NodeSpec, Error> {
    let padded = pad(text);
    let mut t = Tokens::new(&padded, line);

    let id = t.next_u32()?;

    t.expect("(")?;
    let deg = t.next_u32()?;
    t.expect(")")?;

    let mut neighbors = Vec::with_capacity(deg as usize);
    for _ in 0..deg {
        neighbors.push(t.next_u32()?);
    }

    let mut default_slots = Vec::new();
    if !t.is_done() {
        t.expect("[")?;
        while t.peek() != Some("]") {
            default_slots.push(t.next_u32()?);
        }
        t.expect("]")?;
    }

    t.done()?;

    Ok(NodeSpec {
        id,
        neighbors,
        default_slots,
    })
}

/// Space out the literal bracket tokens so glued forms split cleanly
fn pad(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '(' | ')' | '[' | ']' => {
                out.push(' ');
                out.push(c);
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

struct Tokens<'a> {
    toks: Vec<&'a str>,
    pos: usize,
    line: usize,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str, line: usize) -> Self {
        Self {
            toks: text.split_whitespace().collect(),
            pos: 0,
            line,
        }
    }

    fn malformed(&self) -> Error {
        Error::MalformedInput { line: self.line }
    }

    fn peek(&self) -> Option<&'a str> {
        self.toks.get(self.pos).copied()
    }

    fn next(&mut self) -> Result<&'a str, Error> {
        let t = self.peek().ok_or_else(|| self.malformed())?;
        self.pos += 1;
        Ok(t)
    }

    fn next_u32(&mut self) -> Result<u32, Error> {
        let line = self.line;
        self.next()?
            .parse()
            .map_err(|_| Error::MalformedInput { line })
    }

    fn expect(&mut self, sym: &str) -> Result<(), Error> {
        if self.next()? == sym {
            Ok(())
        } else {
            Err(self.malformed())
        }
    }

    fn is_done(&self) -> bool {
        self.pos == self.toks.len()
    }

    fn done(&self) -> Result<(), Error> {
        if self.is_done() {
            Ok(())
        } else {
            Err(self.malformed())
        }
    }
}
