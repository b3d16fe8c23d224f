//! Splits a raw input line into a pipe-separated sequence of stages.
//!
//! The grammar is intentionally tiny: the line is split on the literal `|`
//! character (no escaping), and each chunk is tokenized on runs of
//! whitespace. There is no quoting, so the parser can never fail.

/// One command within a pipe-separated pipeline: a name plus its arguments.
///
/// A stage with an empty name comes from an empty chunk between pipes (or a
/// blank line) and executes as a no-op producing empty output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub name: String,
    pub args: Vec<String>,
}

impl Stage {
    /// True when the chunk contained no tokens at all.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}

/// An ordered sequence of stages. Only the last stage's output is shown to
/// the user; earlier stages feed the next stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
}

impl Pipeline {
    /// Always at least 1: splitting any string on `|` yields one chunk.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Parse a raw line (newline already stripped) into a [`Pipeline`].
pub fn parse_line(line: &str) -> Pipeline {
    let stages = line
        .split('|')
        .map(|chunk| {
            let mut tokens = chunk.split_whitespace().map(str::to_owned);
            let name = tokens.next().unwrap_or_default();
            Stage {
                name,
                args: tokens.collect(),
            }
        })
        .collect();
    Pipeline { stages }
}
