//! # Fan-out Across Processes
//!
//! Every handle on a channel receives every message posted by any other
//! handle on it, exactly once, and never its own.

#[cfg(test)]
mod tests {
    use super::super::*;

    #[tokio::test]
    async fn test_two_processes_exchange_without_echo() {
        let mut cluster = Cluster::start(1, "chat").await;

        cluster.handles[0].post_message("hello from 0");
        cluster.handles[1].post_message("hello from 1");

        assert_eq!(next_message(&mut cluster.handles[0]).await, "hello from 1");
        assert_eq!(next_message(&mut cluster.handles[1]).await, "hello from 0");
        assert_quiet(&mut cluster.handles[0]).await;
        assert_quiet(&mut cluster.handles[1]).await;
    }

    #[tokio::test]
    async fn test_three_processes_each_get_the_other_two() {
        let mut cluster = Cluster::start(2, "chat").await;

        for (i, handle) in cluster.handles.iter().enumerate() {
            handle.post_message(format!("t{i}"));
        }

        for (i, handle) in cluster.handles.iter_mut().enumerate() {
            let expected: Vec<String> = (0..3)
                .filter(|j| *j != i)
                .map(|j| format!("t{j}"))
                .collect();
            assert_eq!(messages(handle, 2).await, expected, "handle {i}");
        }
        for handle in &mut cluster.handles {
            assert_quiet(handle).await;
        }
    }

    #[tokio::test]
    async fn test_every_pair_delivered_exactly_once() {
        // Two handles in each of three processes.
        let mut cluster = Cluster::start(2, "room").await;
        for index in 0..3 {
            let extra = cluster.open(index, "room").await;
            cluster.handles.push(extra);
        }
        let n = cluster.handles.len();

        for (i, handle) in cluster.handles.iter().enumerate() {
            handle.post_message(format!("m{i}"));
        }

        let mut total = 0;
        for (i, handle) in cluster.handles.iter_mut().enumerate() {
            let received = messages(handle, n - 1).await;
            assert!(!received.contains(&format!("m{i}")), "handle {i} got its own message");
            total += received.len();
        }
        assert_eq!(total, n * (n - 1));
        for handle in &mut cluster.handles {
            assert_quiet(handle).await;
        }
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let mut cluster = Cluster::start(1, "A").await;
        let mut b_hub = cluster.open(0, "B").await;
        let b_peer = cluster.open(1, "B").await;

        b_peer.post_message("for B only");

        assert_eq!(next_message(&mut b_hub).await, "for B only");
        assert_quiet(&mut cluster.handles[0]).await;
        assert_quiet(&mut cluster.handles[1]).await;
    }

    #[tokio::test]
    async fn test_posts_from_one_handle_keep_order() {
        let mut cluster = Cluster::start(2, "ordered").await;
        let sent: Vec<String> = (0..50).map(|i| format!("seq {i:02}")).collect();

        for text in &sent {
            cluster.handles[1].post_message(text.as_str());
        }

        for receiver in [0, 2] {
            let mut received = Vec::new();
            for _ in 0..sent.len() {
                received.push(next_message(&mut cluster.handles[receiver]).await);
            }
            assert_eq!(received, sent, "receiver {receiver}");
        }
    }

    #[tokio::test]
    async fn test_closed_handle_stops_receiving() {
        let mut cluster = Cluster::start(1, "chat").await;
        let mut late = cluster.open(1, "chat").await;

        late.close();
        cluster.handles[0].post_message("after close");

        assert_eq!(next_message(&mut cluster.handles[1]).await, "after close");
        assert_eq!(
            late.recv().await,
            Some(hostcast::ChannelEvent::Close),
        );
        assert_eq!(late.recv().await, None);
    }
}
