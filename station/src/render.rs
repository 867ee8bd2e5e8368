use chrono::{DateTime, Local, TimeDelta};
use shared::{Event, Record};

/// Prints events as a timestamped log, one line per event.
pub struct Console {
    opened: DateTime<Local>,
    capacity: usize,
}

impl Console {
    pub fn new(capacity: usize) -> Self {
        Self {
            opened: Local::now(),
            capacity,
        }
    }

    pub fn line(&self, record: &Record) -> String {
        let offset = TimeDelta::from_std(record.at).unwrap_or_else(|_| TimeDelta::zero());
        let at = self.opened + offset;
        format!("[{}] {}", at.format("%H:%M:%S"), self.message(&record.event))
    }

    fn message(&self, event: &Event) -> String {
        match *event {
            Event::ArrivalEntered { unit, depth } => {
                format!("C{unit} entered waiting area ({depth}/{})", self.capacity)
            }
            Event::UnitDequeued { unit, depth, .. } => {
                format!(
                    "C{unit} leaves waiting area for service ({depth}/{})",
                    self.capacity
                )
            }
            ref other => other.to_string(),
        }
    }
}
