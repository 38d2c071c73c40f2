//! # Hub Election
//!
//! Exactly one process wins the port; everyone else becomes a peer of it.
//! Also covers what the hub accepts on the wire.

#[cfg(test)]
mod tests {
    use super::super::*;
    use futures::{SinkExt, StreamExt};
    use shared_types::InstanceId;
    use tokio::io::AsyncWriteExt;
    use tokio_tungstenite::tungstenite::Message;

    #[tokio::test]
    async fn test_racing_processes_elect_one_hub() {
        let address = free_address().await;
        let processes: Vec<ChannelManager> = (0..4).map(|_| process(&address)).collect();
        let mut joined: Vec<_> = processes.iter().map(connection_events).collect();
        let mut handles: Vec<ChannelHandle> = processes
            .iter()
            .map(|p| p.create_channel("race").expect("channel"))
            .collect();

        let mut roles = Vec::new();
        for handle in &handles {
            roles.push(wait_for_role(handle.coordinator()).await);
        }
        let hubs: Vec<usize> = roles
            .iter()
            .enumerate()
            .filter(|(_, role)| **role == CoordinatorState::Server)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(hubs.len(), 1, "roles: {roles:?}");

        // Every other process is a peer of that hub.
        let hub = hubs[0];
        for _ in 1..processes.len() {
            peer_connected(&mut joined[hub]).await;
        }

        let sender = (hub + 1) % handles.len();
        handles[sender].post_message("from a peer");
        for (i, handle) in handles.iter_mut().enumerate() {
            if i != sender {
                assert_eq!(next_message(handle).await, "from a peer", "handle {i}");
            }
        }
    }

    #[tokio::test]
    async fn test_second_process_becomes_peer() {
        let cluster = Cluster::start(1, "chat").await;

        assert_eq!(
            cluster.handles[0].coordinator().state(),
            CoordinatorState::Server
        );
        assert_eq!(
            cluster.handles[1].coordinator().state(),
            CoordinatorState::Client
        );
    }

    #[tokio::test]
    async fn test_hub_speaks_the_envelope_format() {
        let cluster = Cluster::start(0, "chat").await;
        let mut joined = connection_events(&cluster.processes[0]);

        let (mut raw, _) = tokio_tungstenite::connect_async(cluster.address.websocket_url())
            .await
            .expect("raw client");
        peer_connected(&mut joined).await;

        cluster.handles[0].post_message("reply");
        let frame = tokio::time::timeout(WAIT, raw.next())
            .await
            .expect("timeout")
            .expect("frame")
            .expect("websocket");
        let Message::Text(text) = frame else {
            panic!("expected a text frame, got {frame:?}");
        };
        let json: serde_json::Value = serde_json::from_str(text.as_str()).expect("json");
        assert_eq!(json["from"], cluster.handles[0].id().as_str());
        assert_eq!(json["channel"], "chat");
        assert_eq!(json["message"], "reply");
    }

    #[tokio::test]
    async fn test_malformed_frames_are_dropped_not_fatal() {
        let mut cluster = Cluster::start(1, "chat").await;
        let hub_bus = cluster.processes[0].events();
        let mut joined = connection_events(&cluster.processes[0]);
        let mut decode = hub_bus.subscribe(EventFilter::topics(vec![EventTopic::Decode]));

        let (mut raw, _) = tokio_tungstenite::connect_async(cluster.address.websocket_url())
            .await
            .expect("raw client");
        peer_connected(&mut joined).await;

        raw.send(Message::text(r#"{"from": "x", "channel": 7}"#))
            .await
            .expect("send");
        let event = tokio::time::timeout(WAIT, decode.recv())
            .await
            .expect("timeout")
            .expect("event");
        assert!(matches!(event, RelayEvent::DecodeFailed { .. }));

        // Same connection, valid envelope with an extra field.
        let from = InstanceId::new();
        raw.send(Message::text(format!(
            r#"{{"from": "{from}", "channel": "chat", "message": "still here", "extra": true}}"#
        )))
        .await
        .expect("send");

        assert_eq!(next_message(&mut cluster.handles[0]).await, "still here");
        assert_eq!(next_message(&mut cluster.handles[1]).await, "still here");
    }

    #[tokio::test]
    async fn test_plain_http_request_is_not_a_channel_error() {
        let mut cluster = Cluster::start(1, "chat").await;
        let mut joined = connection_events(&cluster.processes[0]);

        let mut browser = tokio::net::TcpStream::connect(("127.0.0.1", cluster.address.port()))
            .await
            .expect("tcp connect");
        browser
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .expect("write request");

        let rejected = tokio::time::timeout(WAIT, async {
            while let Some(event) = joined.recv().await {
                if let RelayEvent::HandshakeRejected { reason, .. } = event {
                    return reason;
                }
            }
            panic!("event bus closed");
        })
        .await
        .expect("timed out waiting for the rejection");
        assert!(!rejected.is_empty());

        assert_quiet(&mut cluster.handles[0]).await;
        assert_eq!(
            cluster.handles[0].coordinator().state(),
            CoordinatorState::Server
        );

        // The hub still relays.
        cluster.handles[1].post_message("after the stray request");
        assert_eq!(
            next_message(&mut cluster.handles[0]).await,
            "after the stray request"
        );
    }
}
