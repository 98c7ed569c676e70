#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgePolicy {
    Rising,
    Falling,
    Both,
}

impl EdgePolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "rising" => Some(Self::Rising),
            "falling" => Some(Self::Falling),
            "both" => Some(Self::Both),
            _ => None,
        }
    }

    pub fn admits(self, connected: bool) -> bool {
        match self {
            Self::Rising => connected,
            Self::Falling => !connected,
            Self::Both => true,
        }
    }
}

// A level must be sampled `debounce_samples` times in a row before it becomes stable. The first
// stable level after start-up only sets the baseline and never produces an edge.
#[derive(Debug, Clone)]
pub struct CableDebouncer {
    debounce_samples: usize,
    policy: EdgePolicy,
    stable_connected: Option<bool>,
    candidate: Option<Candidate>,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    connected: bool,
    count: usize,
}

impl CableDebouncer {
    pub fn new(debounce_samples: usize, policy: EdgePolicy) -> Self {
        Self {
            debounce_samples: debounce_samples.max(1),
            policy,
            stable_connected: None,
            candidate: None,
        }
    }

    pub fn samples_for(debounce_ms: u64, poll_interval_ms: u64) -> usize {
        let poll = poll_interval_ms.max(1);
        usize::try_from(debounce_ms.div_ceil(poll))
            .unwrap_or(usize::MAX)
            .max(1)
    }

    pub fn stable_connected(&self) -> Option<bool> {
        self.stable_connected
    }

    pub fn observe(&mut self, connected: bool) -> Option<bool> {
        match self.stable_connected {
            None => {
                if self.accept_candidate(connected) {
                    self.stable_connected = Some(connected);
                    self.candidate = None;
                }
                None
            }
            Some(stable) if stable == connected => {
                self.candidate = None;
                None
            }
            Some(_) => {
                if !self.accept_candidate(connected) {
                    return None;
                }
                self.stable_connected = Some(connected);
                self.candidate = None;
                self.policy.admits(connected).then_some(connected)
            }
        }
    }

    fn accept_candidate(&mut self, connected: bool) -> bool {
        match self.candidate {
            Some(mut candidate) if candidate.connected == connected => {
                candidate.count += 1;
                self.candidate = Some(candidate);
                candidate.count >= self.debounce_samples
            }
            _ => {
                self.candidate = Some(Candidate {
                    connected,
                    count: 1,
                });
                self.debounce_samples == 1
            }
        }
    }
}
