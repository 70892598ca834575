#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tabquota::libs::config::EngineConfig;
    use tabquota::libs::daemon::run_host;
    use tabquota::libs::native_host::{read_frame, write_frame};
    use tabquota::libs::rule::{RuleMap, RuleStatus};
    use tabquota::libs::store::{KeyValueStore, MemoryStore, RuleStore};
    use tokio::io::{duplex, split, DuplexStream};

    const REDIRECT: &str = "https://example.com/";

    async fn send(stream: &mut DuplexStream, message: Value) {
        write_frame(stream, &serde_json::to_vec(&message).unwrap()).await.unwrap();
    }

    async fn receive(stream: &mut DuplexStream) -> Value {
        let frame = tokio::time::timeout(Duration::from_secs(5), read_frame(stream))
            .await
            .expect("host did not send a message")
            .unwrap()
            .expect("host closed the connection");
        serde_json::from_slice(&frame).unwrap()
    }

    fn config() -> EngineConfig {
        EngineConfig {
            sweep_interval_secs: 3600,
            redirect_url: REDIRECT.to_string(),
            ..EngineConfig::default()
        }
    }

    async fn seeded_backend(rules: &[(&str, u32)]) -> Arc<MemoryStore> {
        let backend = Arc::new(MemoryStore::new());
        let store = RuleStore::new(Arc::clone(&backend) as Arc<dyn KeyValueStore>, config().storage_key);
        let rules: Vec<(String, u32)> = rules.iter().map(|(url, threshold)| (url.to_string(), *threshold)).collect();
        store
            .update(move |map: &mut RuleMap| {
                for (url, threshold) in &rules {
                    map.add(url, *threshold).unwrap();
                }
            })
            .await
            .unwrap();
        backend
    }

    async fn stored_rules(backend: &Arc<MemoryStore>) -> RuleMap {
        RuleStore::new(Arc::clone(backend) as Arc<dyn KeyValueStore>, config().storage_key)
            .read()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_host_redirects_tab_on_exhausted_domain() {
        let backend = seeded_backend(&[("https://a.example", 0)]).await;
        let (host_side, mut browser_side) = duplex(64 * 1024);
        let (reader, writer) = split(host_side);

        let host = tokio::spawn(run_host(reader, writer, Arc::clone(&backend) as Arc<dyn KeyValueStore>, config()));

        // garbage is skipped without ending the session
        send(&mut browser_side, json!({"type": "not_an_event"})).await;
        send(
            &mut browser_side,
            json!({"type": "tab_created", "tabId": 5, "windowId": 1, "pendingUrl": "https://a.example/page"}),
        )
        .await;

        let request = receive(&mut browser_side).await;
        assert_eq!(request["type"], "navigate");
        assert_eq!(request["tabId"], 5);
        assert_eq!(request["url"], REDIRECT);
        send(&mut browser_side, json!({"type": "response", "requestId": request["requestId"]})).await;

        drop(browser_side);
        tokio::time::timeout(Duration::from_secs(5), host).await.unwrap().unwrap().unwrap();

        let rules = stored_rules(&backend).await;
        let rule = rules.find_by_url("https://a.example").unwrap();
        assert_eq!(rule.status, RuleStatus::Expired);
        assert!(rule.tabs.is_empty());
    }

    #[tokio::test]
    async fn test_host_tracks_tabs_and_exits_on_eof() {
        let backend = seeded_backend(&[("https://b.example", 30)]).await;
        let (host_side, mut browser_side) = duplex(64 * 1024);
        let (reader, writer) = split(host_side);

        let host = tokio::spawn(run_host(reader, writer, Arc::clone(&backend) as Arc<dyn KeyValueStore>, config()));

        send(
            &mut browser_side,
            json!({"type": "tab_updated", "tabId": 9, "windowId": 2, "newUrl": "https://b.example/x", "finalUrl": "https://b.example/x"}),
        )
        .await;
        send(&mut browser_side, json!({"type": "tab_attached", "tabId": 9, "newWindowId": 3})).await;

        drop(browser_side);
        tokio::time::timeout(Duration::from_secs(5), host).await.unwrap().unwrap().unwrap();

        let rules = stored_rules(&backend).await;
        let rule = rules.find_by_url("https://b.example").unwrap();
        assert_eq!(rule.tab_ids(), vec![9]);
        assert_eq!(rule.tabs[0].window_id, 3);
        assert!(rule.last_reset_time.is_some());
    }
}
