use std::{
    io,
    sync::{Arc, Mutex},
    time::Duration,
};

use fanoutcore::Hub;
use tokio::time::timeout;

struct LogWriter(Arc<Mutex<Vec<u8>>>);
impl io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
struct MakeLogWriter(Arc<Mutex<Vec<u8>>>);
impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for MakeLogWriter {
    type Writer = LogWriter;
    fn make_writer(&'a self) -> Self::Writer {
        LogWriter(self.0.clone())
    }
}

async fn until_ready(hub: &Hub, channel: &str, n: usize) {
    timeout(Duration::from_secs(2), async {
        loop {
            let ready = hub
                .registry()
                .snapshot(channel)
                .iter()
                .filter(|q| q.is_ready())
                .count();
            if ready >= n {
                break;
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("subscribers never became ready");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn counter_matches_concurrent_publishes() {
    let hub = Hub::new();
    let mut publishers = Vec::new();
    for p in 0..8 {
        let hub = hub.clone();
        publishers.push(tokio::spawn(async move {
            for i in 0..50 {
                hub.publish("load", &format!("{p}-{i}"));
            }
        }));
    }
    for p in publishers {
        p.await.unwrap();
    }
    assert_eq!(hub.status("load").unwrap().messages, 400);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hangup_racing_publish_never_blocks() {
    let hub = Hub::with_drain_grace(Duration::from_millis(50));
    let mut listeners = Vec::new();
    for _ in 0..16 {
        let sub = hub.subscribe("race");
        listeners.push(tokio::spawn(async move {
            let _ = timeout(Duration::from_millis(5), sub.recv()).await;
            sub.hangup();
        }));
    }
    let publisher = {
        let hub = hub.clone();
        tokio::spawn(async move {
            for i in 0..200 {
                hub.publish("race", &i.to_string());
                tokio::task::yield_now().await;
            }
        })
    };
    timeout(Duration::from_secs(5), publisher)
        .await
        .expect("publisher blocked")
        .unwrap();
    for l in listeners {
        l.await.unwrap();
    }
    let status = hub.status("race").unwrap();
    assert_eq!(status.listeners, 0);
    assert_eq!(status.messages, 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn no_delivery_after_removal() {
    let hub = Hub::with_drain_grace(Duration::from_millis(200));
    let keep = hub.subscribe("room");
    let leave = hub.subscribe("room");
    let leaving_queue = hub
        .registry()
        .snapshot("room")
        .into_iter()
        .find(|q| q.id() == leave.id())
        .unwrap();
    leave.hangup();

    let reader = tokio::spawn(async move { keep.recv().await });
    until_ready(&hub, "room", 1).await;
    let delivery = hub.publish("room", "after");
    assert_eq!(delivery.delivered, 1);
    assert_eq!(delivery.dropped, 0);
    assert_eq!(reader.await.unwrap().as_deref(), Some("after"));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(leaving_queue.is_closed());
}

#[tokio::test]
async fn dropped_deliveries_are_logged() {
    let buf = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(MakeLogWriter(buf.clone()))
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let hub = Hub::new();
    let _busy = hub.subscribe("slow");
    let delivery = hub.publish("slow", "nobody home");
    assert_eq!(delivery.dropped, 1);

    let logs = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
    assert!(logs.contains("subscriber registered"), "logs: {logs}");
    assert!(logs.contains("message dropped"), "logs: {logs}");
    assert!(logs.contains("not ready"), "logs: {logs}");
}
