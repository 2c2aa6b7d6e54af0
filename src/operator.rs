//! Operator input during calibration.
//!
//! A click names a pixel; the operator then types the ground coordinate of
//! that pixel in meters. Both steps block the frame loop. At any prompt the
//! operator may type `q` (or `quit`) to end the session.

use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::{PixelPoint, WorldPoint};

/// How often a blocked prompt re-checks the shared quit flag.
const QUIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Answer to one operator prompt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Reply<T> {
    Value(T),
    /// Nothing entered for this frame.
    Idle,
    /// The operator asked to stop, or input ended.
    Quit,
}

pub trait OperatorInput {
    /// Next click of this frame.
    fn poll_click(&mut self) -> Result<Reply<PixelPoint>>;

    /// Ground coordinate of `pixel` in meters.
    fn world_coordinate(&mut self, pixel: PixelPoint) -> Result<Reply<WorldPoint>>;
}

fn is_quit_command(line: &str) -> bool {
    matches!(line.trim(), "q" | "Q" | "quit" | "exit")
}

/// Line-oriented operator over any reader/writer pair, normally stdin/stdout.
///
/// Clicks are entered as `x y` (or `x,y`) pixel coordinates. Lines that do
/// not parse are reported and asked for again. Input is read on a background
/// thread so that a prompt also ends when the shared quit flag is raised
/// (ctrl-c). A quit command typed while no prompt is open raises that flag.
pub struct StdinOperator<W> {
    lines: Receiver<String>,
    output: W,
    quit: Arc<AtomicBool>,
}

impl StdinOperator<std::io::Stdout> {
    pub fn stdio(quit: Arc<AtomicBool>) -> Self {
        Self::new(
            std::io::BufReader::new(std::io::stdin()),
            std::io::stdout(),
            quit,
        )
    }
}

impl<W: Write> StdinOperator<W> {
    pub fn new<R>(input: R, output: W, quit: Arc<AtomicBool>) -> Self
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let reader_quit = Arc::clone(&quit);
        std::thread::spawn(move || {
            for line in input.lines() {
                let Ok(line) = line else { break };
                if is_quit_command(&line) {
                    reader_quit.store(true, Ordering::SeqCst);
                    break;
                }
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        Self {
            lines: rx,
            output,
            quit,
        }
    }

    /// Prompt and wait for one line. `None` means quit.
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        write!(self.output, "{prompt}")?;
        self.output.flush()?;
        loop {
            match self.lines.recv_timeout(QUIT_POLL_INTERVAL) {
                Ok(line) => return Ok(Some(line.trim().to_string())),
                Err(RecvTimeoutError::Timeout) => {
                    if self.quit.load(Ordering::SeqCst) {
                        return Ok(None);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    writeln!(self.output)?;
                    return Ok(None);
                }
            }
        }
    }

    fn read_meters(&mut self, axis: &str) -> Result<Option<f64>> {
        let prompt = format!("Enter real-world {axis} coordinate (meters): ");
        loop {
            let Some(line) = self.read_line(&prompt)? else {
                return Ok(None);
            };
            match line.parse::<f64>() {
                Ok(value) => return Ok(Some(value)),
                Err(_) => writeln!(self.output, "Not a number: {line:?}")?,
            }
        }
    }
}

impl<W: Write> OperatorInput for StdinOperator<W> {
    fn poll_click(&mut self) -> Result<Reply<PixelPoint>> {
        loop {
            let Some(line) = self.read_line("Click at pixel coordinates (x y, q to quit): ")?
            else {
                return Ok(Reply::Quit);
            };
            if let Some(pixel) = parse_click(&line) {
                return Ok(Reply::Value(pixel));
            }
            writeln!(self.output, "Expected two pixel coordinates, got {line:?}")?;
        }
    }

    fn world_coordinate(&mut self, pixel: PixelPoint) -> Result<Reply<WorldPoint>> {
        writeln!(
            self.output,
            "Clicked at pixel coordinates: ({}, {})",
            pixel.x, pixel.y
        )?;
        let Some(x) = self.read_meters("X")? else {
            return Ok(Reply::Quit);
        };
        let Some(y) = self.read_meters("Y")? else {
            return Ok(Reply::Quit);
        };
        Ok(Reply::Value(WorldPoint::new(x, y)))
    }
}

fn parse_click(line: &str) -> Option<PixelPoint> {
    let mut parts = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty());
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(PixelPoint::new(x, y))
}

/// Replays queued clicks and coordinates.
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    clicks: VecDeque<PixelPoint>,
    worlds: VecDeque<WorldPoint>,
    quit_when_done: bool,
    prompts: usize,
}

impl ScriptedOperator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a click and the coordinate typed for it.
    pub fn point(mut self, pixel: PixelPoint, world: WorldPoint) -> Self {
        self.clicks.push_back(pixel);
        self.worlds.push_back(world);
        self
    }

    pub fn click(mut self, pixel: PixelPoint) -> Self {
        self.clicks.push_back(pixel);
        self
    }

    pub fn answer(mut self, world: WorldPoint) -> Self {
        self.worlds.push_back(world);
        self
    }

    /// Ask to quit once the queued input is used up.
    pub fn quit(mut self) -> Self {
        self.quit_when_done = true;
        self
    }

    /// Number of coordinate prompts answered so far.
    pub fn prompts(&self) -> usize {
        self.prompts
    }
}

impl OperatorInput for ScriptedOperator {
    fn poll_click(&mut self) -> Result<Reply<PixelPoint>> {
        Ok(match self.clicks.pop_front() {
            Some(pixel) => Reply::Value(pixel),
            None if self.quit_when_done => Reply::Quit,
            None => Reply::Idle,
        })
    }

    fn world_coordinate(&mut self, _pixel: PixelPoint) -> Result<Reply<WorldPoint>> {
        if let Some(world) = self.worlds.pop_front() {
            self.prompts += 1;
            return Ok(Reply::Value(world));
        }
        if self.quit_when_done {
            return Ok(Reply::Quit);
        }
        Err(anyhow!("no scripted coordinate left"))
    }
}
