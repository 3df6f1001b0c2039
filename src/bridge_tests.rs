//! Unit tests for the bridge module

#[cfg(test)]
mod tests {
    use crate::bridge::{AudioBridge, AudioChunk, BridgeStats};
    use std::{thread, time::Duration};

    #[test]
    fn test_bridge_default_is_empty() {
        let bridge = AudioBridge::default();

        assert_eq!(bridge.buffered_frames(), 0);
        assert_eq!(bridge.backlog(), Duration::ZERO);
        assert_eq!(bridge.next_sample_rate(), None);

        let pulled = bridge.pull(16);
        assert!(pulled.is_empty());
        assert_eq!(pulled.sample_rate, None);
    }

    #[test]
    fn test_bridge_pull_spans_chunk_boundary() {
        let bridge = AudioBridge::new();

        bridge.push(vec![1, 2, 3], 22050);
        bridge.push(vec![4, 5], 22050);

        let pulled = bridge.pull(4);
        assert_eq!(pulled.samples, vec![1, 2, 3, 4]);
        assert_eq!(pulled.sample_rate, Some(22050));
        assert_eq!(bridge.buffered_frames(), 1);

        // Underrun returns what is there without waiting
        let pulled = bridge.pull(10);
        assert_eq!(pulled.samples, vec![5]);
        assert_eq!(bridge.buffered_frames(), 0);
    }

    #[test]
    fn test_bridge_pull_within_single_chunk() {
        let bridge = AudioBridge::new();
        bridge.push(vec![10, 20, 30, 40], 16000);

        assert_eq!(bridge.pull(2).samples, vec![10, 20]);
        assert_eq!(bridge.pull(1).samples, vec![30]);
        assert_eq!(bridge.pull(1).samples, vec![40]);
        assert!(bridge.pull(1).is_empty());
    }

    #[test]
    fn test_bridge_pull_zero_frames() {
        let bridge = AudioBridge::new();
        bridge.push(vec![1, 2], 16000);

        let pulled = bridge.pull(0);
        assert!(pulled.is_empty());
        assert_eq!(bridge.buffered_frames(), 2);
    }

    #[test]
    fn test_bridge_pull_stops_at_sample_rate_change() {
        let bridge = AudioBridge::new();

        bridge.push(vec![1, 2], 22050);
        bridge.push(vec![3, 4], 44100);

        let pulled = bridge.pull(10);
        assert_eq!(pulled.samples, vec![1, 2]);
        assert_eq!(pulled.sample_rate, Some(22050));
        assert_eq!(bridge.next_sample_rate(), Some(44100));

        let pulled = bridge.pull(10);
        assert_eq!(pulled.samples, vec![3, 4]);
        assert_eq!(pulled.sample_rate, Some(44100));
    }

    #[test]
    fn test_bridge_ignores_empty_push() {
        let bridge = AudioBridge::new();

        bridge.push(Vec::new(), 22050);
        bridge.push_chunk(AudioChunk::new(Vec::new(), 44100));

        assert_eq!(bridge.buffered_frames(), 0);
        assert_eq!(bridge.next_sample_rate(), None);
    }

    #[test]
    fn test_bridge_backlog_counts_each_chunk_at_its_rate() {
        let bridge = AudioBridge::new();

        // 0.5s at 1000 Hz + 0.25s at 2000 Hz
        bridge.push(vec![0; 500], 1000);
        bridge.push(vec![0; 500], 2000);
        assert_eq!(bridge.backlog(), Duration::from_millis(750));

        // Consuming 250 frames of the head chunk leaves 0.25s + 0.25s
        bridge.pull(250);
        assert_eq!(bridge.backlog(), Duration::from_millis(500));
    }

    #[test]
    fn test_bridge_clear() {
        let bridge = AudioBridge::new();

        bridge.push(vec![1, 2, 3], 22050);
        bridge.pull(1);
        bridge.clear();

        assert_eq!(bridge.buffered_frames(), 0);
        assert!(bridge.pull(3).is_empty());

        // Reading restarts cleanly at the next chunk
        bridge.push(vec![7, 8], 22050);
        assert_eq!(bridge.pull(2).samples, vec![7, 8]);
    }

    #[test]
    fn test_busy_queue_never_blocks_consumer() {
        let bridge = AudioBridge::new();
        bridge.push(vec![1, 2, 3], 22050);
        assert_eq!(bridge.try_next_sample_rate(), Some(Some(22050)));

        let consumer = bridge.clone();
        let (rate, pulled) = bridge.with_queue_held(|| {
            thread::spawn(move || (consumer.try_next_sample_rate(), consumer.pull(3)))
                .join()
                .unwrap()
        });

        assert_eq!(rate, None);
        assert!(pulled.is_empty());
        assert_eq!(bridge.pull(3).samples, vec![1, 2, 3]);
        assert_eq!(bridge.try_next_sample_rate(), Some(None));
    }

    #[test]
    fn test_bridge_stats() {
        let bridge = AudioBridge::new();

        bridge.push(vec![1, 2, 3], 22050);
        bridge.pull(2);
        bridge.pull(2);

        assert_eq!(
            bridge.stats(),
            BridgeStats {
                pushed_frames: 3,
                pulled_frames: 3,
                underruns: 1,
            }
        );
    }

    #[test]
    fn test_bridge_clones_share_queue() {
        let producer = AudioBridge::new();
        let consumer = producer.clone();

        producer.push(vec![1, 2], 22050);

        assert_eq!(consumer.pull(2).samples, vec![1, 2]);
    }

    #[test]
    fn test_bridge_concurrent_producers_keep_chunks_whole() {
        let bridge = AudioBridge::new();

        let handles: Vec<_> = (0..4i16)
            .map(|producer| {
                let bridge = bridge.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        bridge.push(vec![producer; 8], 22050);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(bridge.buffered_frames(), 4 * 50 * 8);

        // Every 8-frame pull lines up with exactly one chunk from one producer
        for _ in 0..200 {
            let pulled = bridge.pull(8);
            assert_eq!(pulled.len(), 8);
            assert!(pulled.samples.iter().all(|&s| s == pulled.samples[0]));
        }
        assert!(bridge.pull(1).is_empty());
    }

    #[test]
    fn test_chunk_duration() {
        let chunk = AudioChunk::new(vec![0; 11025], 22050);

        assert_eq!(chunk.len(), 11025);
        assert_eq!(chunk.duration(), Duration::from_millis(500));
        assert_eq!(AudioChunk::new(vec![0; 10], 0).duration(), Duration::ZERO);
    }
}
