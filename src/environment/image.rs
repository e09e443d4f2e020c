use std::path::Path;

use hashbrown::HashMap;
use tracing::warn;

use super::{Environment, EpochChallenge, ResultTracker};
use crate::error::{Result, SimError};
use crate::prng::Prng;
use crate::simulation::Stimulus;
use crate::synapse::Step;
use crate::topology::OutputId;

const PIXEL_THRESHOLD: u8 = 50;
const INPUT_CURRENT: f64 = 0.3;

#[derive(Debug, Clone)]
struct LabeledImage {
    output_id: OutputId,
    pixels: Vec<u8>,
}

/// Image classification: one square image per epoch, bright pixels become
/// stimuli at their `(x, y)`, and the output mapped to the image label has
/// to fire.
#[derive(Debug, Clone)]
pub struct ImageEnvironment {
    challenge: EpochChallenge,
    width: usize,
    images: Vec<LabeledImage>,
    exhausted_logged: bool,
}

impl ImageEnvironment {
    /// Parse `label,pixel,pixel,...` rows. Only labels present in
    /// `output_ids` are kept, grouped by ascending label, then shuffled if a
    /// seed is given.
    pub fn from_csv(
        text: &str,
        output_ids: &[(u32, OutputId)],
        shuffle_seed: Option<u64>,
        epoch_length: u64,
        input_delay: u64,
    ) -> Result<Self> {
        let wanted: HashMap<u32, OutputId> = output_ids.iter().copied().collect();
        let mut width = None;
        let mut rows: Vec<(u32, Vec<u8>)> = Vec::new();

        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (label, pixels) = parse_row(line).map_err(|e| SimError::InvalidImage(format!("line {}: {e}", n + 1)))?;

            let w = *width.get_or_insert_with(|| integer_sqrt(pixels.len()));
            if w == 0 || w * w != pixels.len() {
                return Err(SimError::InvalidImage(format!(
                    "line {}: {} pixels is not a {w}x{w} image",
                    n + 1,
                    pixels.len()
                )));
            }
            if wanted.contains_key(&label) {
                rows.push((label, pixels));
            }
        }

        let mut labels: Vec<u32> = wanted.keys().copied().collect();
        labels.sort_unstable();
        let mut images = Vec::with_capacity(rows.len());
        for label in labels {
            for (_, pixels) in rows.iter().filter(|(l, _)| *l == label) {
                images.push(LabeledImage {
                    output_id: wanted[&label],
                    pixels: pixels.clone(),
                });
            }
        }

        if let Some(seed) = shuffle_seed {
            Prng::new(seed).shuffle(&mut images);
        }

        Ok(Self {
            challenge: EpochChallenge::new(epoch_length, input_delay),
            width: width.unwrap_or(0),
            images,
            exhausted_logged: false,
        })
    }

    pub fn from_path(
        path: impl AsRef<Path>,
        output_ids: &[(u32, OutputId)],
        shuffle_seed: Option<u64>,
        epoch_length: u64,
        input_delay: u64,
    ) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_csv(&text, output_ids, shuffle_seed, epoch_length, input_delay)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    fn current(&self, step: Step) -> Option<&LabeledImage> {
        let index = self.challenge.epoch_index(step)?;
        self.images.get(usize::try_from(index).ok()?)
    }
}

fn parse_row(line: &str) -> core::result::Result<(u32, Vec<u8>), String> {
    let mut cells = line.split(',').map(str::trim).filter(|c| !c.is_empty());
    let label = cells
        .next()
        .ok_or_else(|| "missing label".to_string())?
        .parse::<u32>()
        .map_err(|e| format!("bad label: {e}"))?;
    let pixels = cells
        .map(|c| c.parse::<u8>().map_err(|e| format!("bad pixel {c:?}: {e}")))
        .collect::<core::result::Result<Vec<_>, _>>()?;
    Ok((label, pixels))
}

fn integer_sqrt(n: usize) -> usize {
    let mut x = 0;
    while (x + 1) * (x + 1) <= n {
        x += 1;
    }
    x
}

impl Environment for ImageEnvironment {
    fn advance(&mut self, step: Step) {
        self.challenge.advance(step);
        if self.challenge.is_epoch_start(step) && self.current(step).is_none() && !self.exhausted_logged {
            warn!("Ran out of images at step {}; continuing without input", step);
            self.exhausted_logged = true;
        }
    }

    fn active(&self, step: Step) -> bool {
        self.challenge.is_epoch_start(step)
    }

    fn stimuli(&self, step: Step) -> Vec<Stimulus> {
        if !self.challenge.is_epoch_start(step) {
            return Vec::new();
        }
        let Some(image) = self.current(step) else {
            return Vec::new();
        };
        image
            .pixels
            .iter()
            .enumerate()
            .filter(|&(_, &p)| p > PIXEL_THRESHOLD)
            .map(|(i, _)| Stimulus::new((i % self.width) as i32, (i / self.width) as i32, INPUT_CURRENT))
            .collect()
    }

    fn has_reward(&mut self) -> bool {
        self.challenge.has_reward()
    }

    fn accept_fire(&mut self, step: Step, output_id: OutputId) {
        if let Some(desired) = self.desired_output_id(step) {
            self.challenge.record_fire(output_id == desired);
        }
    }

    fn desired_output_id(&self, step: Step) -> Option<OutputId> {
        self.current(step).map(|img| img.output_id)
    }

    fn results(&self) -> Option<&ResultTracker> {
        Some(self.challenge.results())
    }
}
