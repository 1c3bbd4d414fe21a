use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Pushed to the front-end; serialized with a `type` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CoreEvent {
    DownloadProgress { task: String, percent: u8 },
    LoaderInstalled { profile_id: String, success: bool },
    PackageInstalled { profile_id: String, package_id: String, success: bool },
    ProcessOutput { profile_id: String, stream: OutputStream, line: String },
    ProcessExited { profile_id: String, code: Option<i32> },
}

/// Fan-out channel for [`CoreEvent`]s. Emitting never blocks and never fails;
/// with no subscribers the event is dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: CoreEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.emit(CoreEvent::LoaderInstalled { profile_id: "p".into(), success: true });
        assert_eq!(rx.recv().await.unwrap(), CoreEvent::LoaderInstalled { profile_id: "p".into(), success: true });
    }

    #[test]
    fn events_serialize_with_camel_case_fields() {
        let v = serde_json::to_value(CoreEvent::PackageInstalled {
            profile_id: "p".into(),
            package_id: "123".into(),
            success: false,
        })
        .unwrap();
        assert_eq!(v["type"], "packageInstalled");
        assert_eq!(v["packageId"], "123");
        assert_eq!(v["success"], false);
    }
}
