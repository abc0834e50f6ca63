use std::io::{self, BufRead};

/// One typed command for a single timestep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionSymbol {
    Forward,
    Left,
    Backward,
    Right,
    NoOp,
}

/// Planar steering signal `(dx, dy)` consumed by the world model.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlVector {
    pub dx: f32,
    pub dy: f32,
}

impl ControlVector {
    pub const ZERO: ControlVector = ControlVector { dx: 0.0, dy: 0.0 };

    pub const fn new(dx: f32, dy: f32) -> Self {
        Self { dx, dy }
    }

    pub fn to_array(self) -> [f32; 2] {
        [self.dx, self.dy]
    }
}

const STEP: f32 = 0.5;

impl ActionSymbol {
    /// Anything outside `w`, `a`, `s`, `d` is a no-op.
    pub const fn from_char(symbol: char) -> Self {
        match symbol {
            'w' => ActionSymbol::Forward,
            'a' => ActionSymbol::Left,
            's' => ActionSymbol::Backward,
            'd' => ActionSymbol::Right,
            _ => ActionSymbol::NoOp,
        }
    }

    pub const fn control_vector(self) -> ControlVector {
        match self {
            ActionSymbol::Forward => ControlVector::new(STEP, 0.0),
            ActionSymbol::Backward => ControlVector::new(-STEP, 0.0),
            ActionSymbol::Left => ControlVector::new(0.0, -STEP),
            ActionSymbol::Right => ControlVector::new(0.0, STEP),
            ActionSymbol::NoOp => ControlVector::ZERO,
        }
    }

    pub const fn as_char(self) -> char {
        match self {
            ActionSymbol::Forward => 'w',
            ActionSymbol::Left => 'a',
            ActionSymbol::Backward => 's',
            ActionSymbol::Right => 'd',
            ActionSymbol::NoOp => ' ',
        }
    }
}

pub fn parse_symbols(line: &str) -> Vec<ActionSymbol> {
    line.chars().map(ActionSymbol::from_char).collect()
}

/// Maps each typed character to its control vector; output length equals input length.
pub fn encode_actions(line: &str) -> Vec<ControlVector> {
    line.chars()
        .map(|symbol| ActionSymbol::from_char(symbol).control_vector())
        .collect()
}

/// Source of per-round command lines. `Ok(None)` means the input was closed.
pub trait CommandSource {
    fn next_line(&mut self) -> io::Result<Option<String>>;
}

/// Reads one round per line from any buffered reader (stdin in the binary).
#[derive(Debug)]
pub struct LineCommandSource<R> {
    reader: R,
}

impl<R: BufRead> LineCommandSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> CommandSource for LineCommandSource<R> {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        Ok(Some(trimmed.to_string()))
    }
}
