//! Seams to the outside world: item actions, clipboard and clock.

use crate::error::{Error, Result};
use crate::model::{DedicatedAiCluster, Environment, GpuNode, GpuPool};
use async_trait::async_trait;
use chrono::{DateTime, Local};

/// Mutating operations on cluster objects and cloud resources.
#[async_trait]
pub trait InfraActions: Send + Sync {
    async fn delete_dac(&self, env: &Environment, dac: &DedicatedAiCluster) -> Result<()>;

    async fn set_cordon(&self, env: &Environment, node: &GpuNode, cordon: bool) -> Result<()>;

    async fn drain(&self, env: &Environment, node: &GpuNode) -> Result<()>;

    async fn reboot(&self, env: &Environment, node: &GpuNode) -> Result<()>;

    async fn scale_pool(&self, env: &Environment, pool: &GpuPool, size: i64) -> Result<()>;
}

pub trait Clipboard: Send {
    fn read_all(&mut self) -> Result<String>;

    fn write_all(&mut self, text: &str) -> Result<()>;
}

/// System clipboard through `arboard`.
#[derive(Debug, Default)]
pub struct SystemClipboard;

fn clipboard_error(action: &str, error: arboard::Error) -> Error {
    Error::action(action, "clipboard", error)
}

impl Clipboard for SystemClipboard {
    fn read_all(&mut self) -> Result<String> {
        let mut clipboard =
            arboard::Clipboard::new().map_err(|error| clipboard_error("paste", error))?;
        clipboard
            .get_text()
            .map_err(|error| clipboard_error("paste", error))
    }

    fn write_all(&mut self, text: &str) -> Result<()> {
        let mut clipboard =
            arboard::Clipboard::new().map_err(|error| clipboard_error("copy", error))?;
        clipboard
            .set_text(text.to_string())
            .map_err(|error| clipboard_error("copy", error))
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{Clipboard, Clock, InfraActions};
    use crate::error::{Error, Result};
    use crate::model::{DedicatedAiCluster, Environment, GpuNode, GpuPool};
    use async_trait::async_trait;
    use chrono::{DateTime, Local, TimeZone};
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct MemoryClipboard {
        pub(crate) text: String,
    }

    impl Clipboard for MemoryClipboard {
        fn read_all(&mut self) -> Result<String> {
            Ok(self.text.clone())
        }

        fn write_all(&mut self, text: &str) -> Result<()> {
            self.text = text.to_string();
            Ok(())
        }
    }

    pub(crate) struct FixedClock;

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Local> {
            Local.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap()
        }
    }

    /// Records every call and fails when `fail` is set.
    #[derive(Default)]
    pub(crate) struct RecordingActions {
        pub(crate) calls: Mutex<Vec<String>>,
        pub(crate) fail: bool,
    }

    impl RecordingActions {
        fn record(&self, call: String) -> Result<()> {
            self.calls.lock().unwrap().push(call.clone());
            if self.fail {
                Err(Error::action(call, "test", "refused"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl InfraActions for RecordingActions {
        async fn delete_dac(&self, _env: &Environment, dac: &DedicatedAiCluster) -> Result<()> {
            self.record(format!("delete {}", dac.name))
        }

        async fn set_cordon(&self, _env: &Environment, node: &GpuNode, cordon: bool) -> Result<()> {
            self.record(format!("cordon {} {cordon}", node.name))
        }

        async fn drain(&self, _env: &Environment, node: &GpuNode) -> Result<()> {
            self.record(format!("drain {}", node.name))
        }

        async fn reboot(&self, _env: &Environment, node: &GpuNode) -> Result<()> {
            self.record(format!("reboot {}", node.name))
        }

        async fn scale_pool(&self, _env: &Environment, pool: &GpuPool, size: i64) -> Result<()> {
            self.record(format!("scale {} {size}", pool.name))
        }
    }

    #[tokio::test]
    async fn recording_actions_report_failures() {
        let env = Environment::new("oc1", "dev", "us-chicago-1");
        let node = GpuNode {
            name: "n1".to_string(),
            ..GpuNode::default()
        };

        let ok = RecordingActions::default();
        assert!(ok.drain(&env, &node).await.is_ok());
        assert_eq!(ok.calls.lock().unwrap().as_slice(), ["drain n1".to_string()]);

        let failing = RecordingActions {
            fail: true,
            ..RecordingActions::default()
        };
        assert!(matches!(
            failing.set_cordon(&env, &node, true).await,
            Err(Error::Action { .. })
        ));
    }

    #[test]
    fn memory_clipboard_round_trips_text() {
        let mut clipboard = MemoryClipboard::default();
        clipboard.write_all("tenantA").unwrap();
        assert_eq!(clipboard.read_all().unwrap(), "tenantA");
        assert_eq!(FixedClock.now().format("%Y").to_string(), "2026");
    }
}
