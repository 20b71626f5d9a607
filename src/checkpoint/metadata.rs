use serde::{Deserialize, Serialize};

/// Checkpoint description written to metadata.json alongside the weights.
///
/// The spatial dimensions double as the schema check on restore: a checkpoint
/// only loads into an estimator built for the same screen size. The counters
/// make the full parameter set (weights plus step/episode trackers) one
/// restorable unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub name: String,
    pub screen_rows: usize,
    pub screen_cols: usize,
    pub learning_rate: f64,
    pub global_step: u64,
    pub global_episode: u64,
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_serde_roundtrip() {
        let meta = CheckpointMetadata {
            name: "DQN".to_string(),
            screen_rows: 64,
            screen_cols: 64,
            learning_rate: 1e-4,
            global_step: 1200,
            global_episode: 34,
            timestamp: 1700000000,
        };

        let json = serde_json::to_string_pretty(&meta).unwrap();
        let deserialized: CheckpointMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.name, "DQN");
        assert_eq!(deserialized.screen_rows, 64);
        assert_eq!(deserialized.global_step, 1200);
        assert_eq!(deserialized.global_episode, 34);
    }
}
