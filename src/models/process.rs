use os_api::ProcessEntry;

/// One process as seen in a single tick. Discarded after the tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub name: String,
    /// Share of the whole machine, 0.0 - 100.0; 0 when unknown.
    pub cpu_usage: f32,
}

impl ProcessSnapshot {
    pub fn new(pid: u32, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
            cpu_usage: 0.0,
        }
    }

    pub fn with_cpu(mut self, cpu_usage: f32) -> Self {
        self.cpu_usage = cpu_usage;
        self
    }

    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }
}

impl From<ProcessEntry> for ProcessSnapshot {
    fn from(entry: ProcessEntry) -> Self {
        Self {
            pid: entry.pid,
            name: entry.name,
            cpu_usage: entry.cpu_usage,
        }
    }
}
