use crate::command::{now_timestamp, Command, SerializedCommand};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use tracing::{error, info};

pub const BATCH_TAG: &str = "Batch";

/// Ordered group of commands that is undone and redone as one history entry.
///
/// `execute` applies front-to-back and rolls back the applied prefix when a
/// sub-command fails. `undo` walks back-to-front and stops at the first failure;
/// the sub-commands it had already undone in that call are re-applied so the
/// batch is left fully applied and can be retried.
pub struct BatchCommand {
    commands: Vec<Box<dyn Command>>,
    description: String,
    timestamp: String,
}

impl fmt::Debug for BatchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchCommand")
            .field("commands_count", &self.commands.len())
            .field("description", &self.description)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

impl BatchCommand {
    pub fn new(commands: Vec<Box<dyn Command>>, description: impl Into<String>) -> Self {
        Self {
            commands,
            description: description.into(),
            timestamp: now_timestamp(),
        }
    }

    pub(crate) fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Box<dyn Command>] {
        &self.commands
    }

    pub fn batch_description(&self) -> &str {
        &self.description
    }
}

impl Command for BatchCommand {
    fn tag(&self) -> String {
        BATCH_TAG.to_string()
    }

    fn timestamp(&self) -> &str {
        &self.timestamp
    }

    fn is_batch(&self) -> bool {
        true
    }

    fn execute(&self) -> bool {
        for (i, cmd) in self.commands.iter().enumerate() {
            if cmd.execute() {
                continue;
            }
            error!(index = i, tag = %cmd.tag(), "batch failed, rolling back");
            for j in (0..i).rev() {
                if !self.commands[j].undo() {
                    error!(index = j, "rollback of batch entry failed");
                }
            }
            return false;
        }
        info!(count = self.commands.len(), "batch executed");
        true
    }

    fn undo(&self) -> bool {
        for (undone, cmd) in self.commands.iter().rev().enumerate() {
            if cmd.undo() {
                continue;
            }
            error!(description = %cmd.describe(), "batch undo failed");
            let start = self.commands.len() - undone;
            for (j, reapply) in self.commands.iter().enumerate().skip(start) {
                if !reapply.execute() {
                    error!(index = j, "re-apply of batch entry failed");
                }
            }
            return false;
        }
        info!(count = self.commands.len(), "batch undone");
        true
    }

    fn describe(&self) -> String {
        format!("{} ({} changes)", self.description, self.commands.len())
    }

    fn serialize(&self) -> SerializedCommand {
        let mut entry = SerializedCommand::new(BATCH_TAG, self.timestamp.clone());
        entry.fields.insert(
            "batch_description".to_string(),
            Value::String(self.description.clone()),
        );
        entry.fields.insert(
            "commands".to_string(),
            Value::Array(
                self.commands
                    .iter()
                    .map(|cmd| cmd.serialize().to_value())
                    .collect(),
            ),
        );
        entry
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    // Records every call; fails the operations listed in `fail_on`.
    struct Step {
        name: &'static str,
        fail_on: &'static [&'static str],
        log: Log,
    }

    impl Step {
        fn boxed(name: &'static str, fail_on: &'static [&'static str], log: &Log) -> Box<dyn Command> {
            Box::new(Step {
                name,
                fail_on,
                log: log.clone(),
            })
        }

        fn call(&self, op: &str) -> bool {
            self.log.lock().unwrap().push(format!("{}:{}", op, self.name));
            !self.fail_on.iter().any(|f| *f == op)
        }
    }

    impl Command for Step {
        fn tag(&self) -> String {
            "Step".to_string()
        }
        fn timestamp(&self) -> &str {
            "2024-01-01 00:00:00"
        }
        fn execute(&self) -> bool {
            self.call("execute")
        }
        fn undo(&self) -> bool {
            self.call("undo")
        }
        fn describe(&self) -> String {
            self.name.to_string()
        }
        fn serialize(&self) -> SerializedCommand {
            SerializedCommand::new("Step", self.timestamp())
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn calls(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[test]
    fn test_execute_in_order() {
        let log = Log::default();
        let batch = BatchCommand::new(
            vec![Step::boxed("a", &[], &log), Step::boxed("b", &[], &log)],
            "Import",
        );
        assert!(batch.execute());
        assert_eq!(calls(&log), vec!["execute:a", "execute:b"]);
    }

    #[test]
    fn test_execute_failure_rolls_back_prefix() {
        let log = Log::default();
        let batch = BatchCommand::new(
            vec![
                Step::boxed("a", &[], &log),
                Step::boxed("b", &[], &log),
                Step::boxed("c", &["execute"], &log),
                Step::boxed("d", &[], &log),
            ],
            "Import",
        );
        assert!(!batch.execute());
        assert_eq!(
            calls(&log),
            vec!["execute:a", "execute:b", "execute:c", "undo:b", "undo:a"]
        );
    }

    #[test]
    fn test_rollback_continues_past_failed_undo() {
        let log = Log::default();
        let batch = BatchCommand::new(
            vec![
                Step::boxed("a", &[], &log),
                Step::boxed("b", &["undo"], &log),
                Step::boxed("c", &["execute"], &log),
            ],
            "Import",
        );
        assert!(!batch.execute());
        assert_eq!(
            calls(&log),
            vec!["execute:a", "execute:b", "execute:c", "undo:b", "undo:a"]
        );
    }

    #[test]
    fn test_undo_reverse_order() {
        let log = Log::default();
        let batch = BatchCommand::new(
            vec![Step::boxed("a", &[], &log), Step::boxed("b", &[], &log)],
            "Cleanup",
        );
        assert!(batch.undo());
        assert_eq!(calls(&log), vec!["undo:b", "undo:a"]);
    }

    #[test]
    fn test_undo_stops_and_reapplies() {
        let log = Log::default();
        let batch = BatchCommand::new(
            vec![
                Step::boxed("a", &[], &log),
                Step::boxed("b", &["undo"], &log),
                Step::boxed("c", &[], &log),
                Step::boxed("d", &[], &log),
            ],
            "Cleanup",
        );
        assert!(!batch.undo());
        // "a" is never attempted; "c" and "d" are put back in forward order
        assert_eq!(
            calls(&log),
            vec!["undo:d", "undo:c", "undo:b", "execute:c", "execute:d"]
        );
    }

    #[test]
    fn test_redo_reruns_from_start() {
        let log = Log::default();
        let batch = BatchCommand::new(
            vec![Step::boxed("a", &[], &log), Step::boxed("b", &[], &log)],
            "Import",
        );
        assert!(batch.redo());
        assert_eq!(calls(&log), vec!["execute:a", "execute:b"]);
    }

    #[test]
    fn test_describe_and_flags() {
        let log = Log::default();
        let batch = BatchCommand::new(
            vec![
                Step::boxed("a", &[], &log),
                Step::boxed("b", &[], &log),
                Step::boxed("c", &[], &log),
            ],
            "Import bank statement",
        );
        assert_eq!(batch.describe(), "Import bank statement (3 changes)");
        assert!(batch.is_batch());
        assert_eq!(batch.tag(), "Batch");
    }

    #[test]
    fn test_empty_batch() {
        let batch = BatchCommand::new(Vec::new(), "Nothing");
        assert!(batch.execute());
        assert!(batch.undo());
        assert_eq!(batch.describe(), "Nothing (0 changes)");
    }

    #[test]
    fn test_serialize_nests_entries() {
        let log = Log::default();
        let batch = BatchCommand::new(vec![Step::boxed("a", &[], &log)], "Import")
            .with_timestamp("2024-05-06 07:08:09");
        let value = batch.serialize().to_value();

        assert_eq!(value["type"], "Batch");
        assert_eq!(value["timestamp"], "2024-05-06 07:08:09");
        assert_eq!(value["batch_description"], "Import");
        assert_eq!(value["commands"][0]["type"], "Step");
    }
}
