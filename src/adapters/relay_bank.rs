use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

use crate::adapters::gpio::{GpioError, LineLevel, OutputLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PowerPortSpec {
    pub port: u32,
    pub power: u32,
}

// Keeps the first occurrence of every physical port.
pub fn dedupe_ports(specs: &[PowerPortSpec]) -> Vec<PowerPortSpec> {
    let mut seen = Vec::with_capacity(specs.len());
    let mut unique = Vec::with_capacity(specs.len());
    for spec in specs {
        if !seen.contains(&spec.port) {
            seen.push(spec.port);
            unique.push(*spec);
        }
    }
    unique
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("no relay configured for power {0}")]
    UnknownRelay(u32),
    #[error("relay line failure: {0}")]
    Gpio(#[from] GpioError),
}

pub trait HardwareIo: Send {
    fn has_relay(&self, power: u32) -> bool;
    fn set_relay(&mut self, power: u32, energized: bool) -> Result<(), RelayError>;
    /// De-energizes every relay, attempting all lines even when one fails.
    fn all_off(&mut self) -> Result<(), RelayError>;
    fn release(&mut self) -> Result<(), RelayError>;
}

#[derive(Debug)]
pub struct RelayBank<O> {
    lines: BTreeMap<u32, O>,
    rest_level: LineLevel,
}

impl<O: OutputLine> RelayBank<O> {
    pub fn open<F>(
        ports: &[PowerPortSpec],
        rest_level: LineLevel,
        mut open: F,
    ) -> Result<Self, RelayError>
    where
        F: FnMut(u32, LineLevel) -> Result<O, GpioError>,
    {
        let mut bank = Self {
            lines: BTreeMap::new(),
            rest_level,
        };

        for spec in dedupe_ports(ports) {
            match open(spec.port, rest_level) {
                Ok(line) => {
                    tracing::debug!(port = spec.port, power = spec.power, "relay line claimed");
                    bank.lines.insert(spec.power, line);
                }
                Err(error) => {
                    if let Err(release_error) = bank.release() {
                        tracing::warn!(
                            error = %release_error,
                            "failed to release partially opened relay bank"
                        );
                    }
                    return Err(RelayError::Gpio(error));
                }
            }
        }

        Ok(bank)
    }

    pub fn powers(&self) -> Vec<u32> {
        self.lines.keys().copied().collect()
    }

    fn level_for(&self, energized: bool) -> LineLevel {
        if energized {
            self.rest_level.inverted()
        } else {
            self.rest_level
        }
    }
}

impl<O: OutputLine> HardwareIo for RelayBank<O> {
    fn has_relay(&self, power: u32) -> bool {
        self.lines.contains_key(&power)
    }

    fn set_relay(&mut self, power: u32, energized: bool) -> Result<(), RelayError> {
        let level = self.level_for(energized);
        let line = self
            .lines
            .get_mut(&power)
            .ok_or(RelayError::UnknownRelay(power))?;
        line.write(level)?;
        Ok(())
    }

    fn all_off(&mut self) -> Result<(), RelayError> {
        let level = self.rest_level;
        let mut first_error = None;
        for (power, line) in &mut self.lines {
            if let Err(error) = line.write(level) {
                tracing::error!(power, pin = line.pin(), error = %error, "failed to de-energize relay");
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), |error| Err(RelayError::Gpio(error)))
    }

    fn release(&mut self) -> Result<(), RelayError> {
        let mut first_error = None;
        for (power, mut line) in std::mem::take(&mut self.lines) {
            if let Err(error) = line.release() {
                tracing::warn!(power, pin = line.pin(), error = %error, "failed to release relay line");
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), |error| Err(RelayError::Gpio(error)))
    }
}
