//! # Failover
//!
//! When the hub process goes away, exactly one of the remaining peers takes
//! over and message exchange resumes. Handles never notice beyond a gap.

#[cfg(test)]
mod tests {
    use super::super::*;
    use tokio::time::timeout;

    /// Wait until one of `coordinators` is hub and every other one has
    /// connected to it. Returns the new hub's index.
    ///
    /// Right after the old hub dies the survivors may still report
    /// `Client`, so roles are polled until a hub shows up.
    async fn settle(coordinators: &[Coordinator], joined: &mut [Subscription]) -> usize {
        let hub = timeout(WAIT, async {
            loop {
                let hubs: Vec<usize> = coordinators
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| c.state() == CoordinatorState::Server)
                    .map(|(i, _)| i)
                    .collect();
                assert!(hubs.len() <= 1, "two hubs at once: {hubs:?}");
                if let [hub] = hubs.as_slice() {
                    return *hub;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for a new hub");

        for _ in 1..coordinators.len() {
            peer_connected(&mut joined[hub]).await;
        }
        for (i, coordinator) in coordinators.iter().enumerate() {
            if i != hub {
                wait_for_state(coordinator, CoordinatorState::Client).await;
            }
        }
        hub
    }

    #[tokio::test]
    async fn test_peer_takes_over_when_hub_shuts_down() {
        let mut cluster = Cluster::start(2, "chat").await;
        let mut joined: Vec<Subscription> =
            cluster.processes[1..].iter().map(connection_events).collect();

        // Kill the hub process.
        let mut hub_handle = cluster.handles.remove(0);
        let hub = cluster.processes.remove(0);
        for coordinator in hub.shutdown() {
            timeout(WAIT, coordinator.closed())
                .await
                .expect("hub teardown");
        }
        assert_eq!(hub_handle.recv().await, Some(ChannelEvent::Close));

        let coordinators: Vec<Coordinator> = cluster
            .handles
            .iter()
            .map(|h| h.coordinator().clone())
            .collect();
        let new_hub = settle(&coordinators, &mut joined).await;
        let peer = 1 - new_hub;

        cluster.handles[peer].post_message("after failover");
        assert_eq!(
            next_message(&mut cluster.handles[new_hub]).await,
            "after failover"
        );
        cluster.handles[new_hub].post_message("ack");
        assert_eq!(next_message(&mut cluster.handles[peer]).await, "ack");

        // The hub change was invisible: no close, no error.
        assert_quiet(&mut cluster.handles[0]).await;
        assert_quiet(&mut cluster.handles[1]).await;
    }

    #[tokio::test]
    async fn test_closing_last_handle_releases_the_port() {
        let mut cluster = Cluster::start(1, "chat").await;
        let mut joined = vec![connection_events(&cluster.processes[1])];

        // The hub process closes its only handle; its coordinator goes away.
        let hub_handle = cluster.handles.remove(0);
        let coordinator = hub_handle.coordinator().clone();
        hub_handle.close();
        timeout(WAIT, coordinator.closed())
            .await
            .expect("hub teardown");

        let survivor = cluster.handles[0].coordinator().clone();
        wait_for_state(&survivor, CoordinatorState::Server).await;

        // A newcomer joins the new hub.
        let newcomer = process(&cluster.address);
        let late = newcomer.create_channel("chat").expect("channel");
        wait_for_state(late.coordinator(), CoordinatorState::Client).await;
        peer_connected(&mut joined[0]).await;

        late.post_message("hi");
        assert_eq!(next_message(&mut cluster.handles[0]).await, "hi");
    }

    #[tokio::test]
    async fn test_repeated_failover() {
        let mut cluster = Cluster::start(3, "chat").await;

        // Remove the current hub twice in a row.
        for round in 0..2 {
            let mut joined: Vec<Subscription> = cluster
                .processes
                .iter()
                .map(connection_events)
                .collect();
            let hub = cluster
                .handles
                .iter()
                .position(|h| h.coordinator().state() == CoordinatorState::Server)
                .expect("a hub");

            drop(cluster.handles.remove(hub));
            let gone = cluster.processes.remove(hub);
            joined.remove(hub);
            for coordinator in gone.shutdown() {
                timeout(WAIT, coordinator.closed())
                    .await
                    .expect("hub teardown");
            }

            let coordinators: Vec<Coordinator> = cluster
                .handles
                .iter()
                .map(|h| h.coordinator().clone())
                .collect();
            let new_hub = settle(&coordinators, &mut joined).await;

            let sender = (new_hub + 1) % cluster.handles.len();
            let text = format!("round {round}");
            cluster.handles[sender].post_message(text.as_str());
            for (i, handle) in cluster.handles.iter_mut().enumerate() {
                if i != sender {
                    assert_eq!(next_message(handle).await, text, "round {round}, handle {i}");
                }
            }
        }
    }
}
