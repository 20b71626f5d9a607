use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use burn::backend::Autodiff;
use burn::backend::NdArray;
use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{GradientsParams, Optimizer, RmsProp, RmsPropConfig};
use burn::prelude::*;
use burn::record::DefaultRecorder;

use crate::checkpoint::{self, CheckpointMetadata};
use crate::config::EstimatorConfig;
use crate::error::{EstimatorError, PersistenceError};
use crate::network::encoding::encode_batch;
use crate::network::loss::{batch_q_stats, scalar, td_loss};
use crate::network::model::{MovementQNetwork, MovementQNetworkConfig};
use crate::observation::Observation;
use crate::telemetry::{
    SummaryWriter, JsonlSummaryWriter, LOSS_TAG, MAX_Q_TAG, MEAN_Q_TAG, SCORE_TAG,
};

type InferBackend = NdArray<f32>;
type TrainBackend = Autodiff<InferBackend>;

/// The full parameter set: learnable weights plus the two lifecycle counters.
///
/// Held behind an `Option` until `initialize_parameters` or `restore` runs,
/// and swapped wholesale on restore so no caller observes partial state.
struct Params {
    network: MovementQNetwork<TrainBackend>,
    global_step: u64,
    global_episode: u64,
}

/// Q-value estimator for spatial movement actions.
///
/// One instance owns one network, its RMSProp optimizer, the step/episode
/// counters, and an injected summary sink. All operations are synchronous and
/// driven by a single external training loop; `&mut self` receivers enforce
/// the serial-caller contract.
pub struct MovementValueEstimator {
    config: EstimatorConfig,
    device: <TrainBackend as Backend>::Device,
    optimizer: OptimizerAdaptor<RmsProp, MovementQNetwork<TrainBackend>, TrainBackend>,
    writer: Box<dyn SummaryWriter>,
    params: Option<Params>,
}

impl MovementValueEstimator {
    /// Build an estimator writing summaries to the file at
    /// `config.summary_path`. Parameters stay empty until
    /// [`initialize_parameters`](Self::initialize_parameters) or
    /// [`restore`](Self::restore) runs.
    pub fn new(config: EstimatorConfig) -> Result<Self, EstimatorError> {
        let writer = JsonlSummaryWriter::open(&config.summary_path)
            .map_err(|e| EstimatorError::Persistence(e.into()))?;
        Ok(Self::with_writer(config, Box::new(writer)))
    }

    /// Build an estimator with an injected summary sink.
    pub fn with_writer(config: EstimatorConfig, writer: Box<dyn SummaryWriter>) -> Self {
        let device = Default::default();
        let optimizer = RmsPropConfig::new().init();
        MovementValueEstimator {
            config,
            device,
            optimizer,
            writer,
            params: None,
        }
    }

    /// Randomly initialize all layer parameters and zero both counters.
    ///
    /// Must run once on a freshly constructed, non-restored instance before
    /// any other operation. Running it again re-randomizes the weights and
    /// resets the counters.
    pub fn initialize_parameters(&mut self) {
        let net_config = MovementQNetworkConfig {};
        self.params = Some(Params {
            network: net_config.init(&self.device),
            global_step: 0,
            global_episode: 0,
        });
    }

    /// Perform one gradient step against externally supplied TD targets.
    ///
    /// Returns the scalar loss computed before the update. On a shape error
    /// nothing is mutated; on success the weights and `global_step` change
    /// together.
    pub fn update(
        &mut self,
        states: &[Observation],
        actions: &[Vec<f32>],
        targets: &[f32],
    ) -> Result<f32, EstimatorError> {
        self.validate_batch(states, actions, targets)?;
        let params = self.params.as_mut().ok_or(EstimatorError::Uninitialized)?;

        let input = encode_batch::<TrainBackend>(states, &self.device);
        let flat = params.network.forward(input);
        let loss = td_loss(flat, actions, targets, &self.device);
        let loss_val = scalar(loss.clone());

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &params.network);
        params.network =
            self.optimizer
                .step(self.config.learning_rate, params.network.clone(), grads);
        params.global_step += 1;

        Ok(loss_val)
    }

    /// Append loss, the external score, and batch Q statistics to the summary
    /// stream, keyed by the most recently completed episode
    /// (`global_episode - 1`). Parameters are not touched.
    pub fn log_summary(
        &mut self,
        states: &[Observation],
        actions: &[Vec<f32>],
        targets: &[f32],
        score: f32,
    ) -> Result<(), EstimatorError> {
        self.validate_batch(states, actions, targets)?;
        let params = self.params.as_ref().ok_or(EstimatorError::Uninitialized)?;

        let network = params.network.valid();
        let input = encode_batch::<InferBackend>(states, &self.device);
        let flat = network.forward(input);

        let (max_q, mean_q) = batch_q_stats(&flat);
        let loss = scalar(td_loss(flat, actions, targets, &self.device));
        let episode = params.global_episode.saturating_sub(1);

        self.writer
            .add_scalar(LOSS_TAG, loss, episode)
            .map_err(summary_io)?;
        self.writer
            .add_scalar(SCORE_TAG, score, episode)
            .map_err(summary_io)?;
        self.writer
            .add_scalar(MAX_Q_TAG, max_q, episode)
            .map_err(summary_io)?;
        self.writer
            .add_scalar(MEAN_Q_TAG, mean_q, episode)
            .map_err(summary_io)?;
        self.writer.flush().map_err(summary_io)?;
        Ok(())
    }

    /// Advance the episode counter by exactly one. Independent of the
    /// gradient step counter.
    pub fn increment_episode(&mut self) -> Result<(), EstimatorError> {
        let params = self.params.as_mut().ok_or(EstimatorError::Uninitialized)?;
        params.global_episode += 1;
        Ok(())
    }

    /// Per-cell Q-values for each observation, flattened x-major
    /// (index `x * rows + y`). Forward pass only; used by the caller for
    /// greedy action selection.
    pub fn q_values(&self, states: &[Observation]) -> Result<Vec<Vec<f32>>, EstimatorError> {
        self.validate_states(states)?;
        let params = self.params.as_ref().ok_or(EstimatorError::Uninitialized)?;

        let network = params.network.valid();
        let input = encode_batch::<InferBackend>(states, &self.device);
        let flat = network.forward(input);

        let cells = self.config.action_len();
        let data: Vec<f32> = flat
            .into_data()
            .to_vec()
            .expect("f32 tensor data extraction");
        Ok(data.chunks(cells).map(|chunk| chunk.to_vec()).collect())
    }

    /// Serialize the full parameter set (weights and both counters) to a
    /// checkpoint directory at `destination`, atomically.
    pub fn save(&self, destination: &Path) -> Result<(), EstimatorError> {
        let params = self.params.as_ref().ok_or(EstimatorError::Uninitialized)?;

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let metadata = CheckpointMetadata {
            name: self.config.name.clone(),
            screen_rows: self.config.screen_rows,
            screen_cols: self.config.screen_cols,
            learning_rate: self.config.learning_rate,
            global_step: params.global_step,
            global_episode: params.global_episode,
            timestamp,
        };

        checkpoint::write_checkpoint(destination, &metadata, |staging| {
            let recorder = DefaultRecorder::default();
            params
                .network
                .clone()
                .valid()
                .save_file(staging.join(checkpoint::WEIGHTS_FILE), &recorder)
                .map_err(|e| PersistenceError::ModelSave(e.to_string()))
        })?;
        Ok(())
    }

    /// Save to the configured `checkpoint_dir`.
    pub fn save_checkpoint(&self) -> Result<(), EstimatorError> {
        let destination = self.config.checkpoint_dir.clone();
        self.save(&destination)
    }

    /// Replace the in-memory parameter set with the one stored at `source`.
    ///
    /// The checkpoint must come from an estimator with the same spatial
    /// dimensions; the swap happens only after the weights load fully, so a
    /// failed restore leaves the previous parameters in place.
    pub fn restore(&mut self, source: &Path) -> Result<(), EstimatorError> {
        let metadata = checkpoint::read_metadata(source)?;
        if metadata.screen_rows != self.config.screen_rows
            || metadata.screen_cols != self.config.screen_cols
        {
            return Err(PersistenceError::SchemaMismatch {
                expected_rows: self.config.screen_rows,
                expected_cols: self.config.screen_cols,
                found_rows: metadata.screen_rows,
                found_cols: metadata.screen_cols,
            }
            .into());
        }

        let recorder = DefaultRecorder::default();
        let net_config = MovementQNetworkConfig {};
        let network: MovementQNetwork<TrainBackend> = net_config
            .init(&self.device)
            .load_file(source.join(checkpoint::WEIGHTS_FILE), &recorder, &self.device)
            .map_err(|e| PersistenceError::ModelLoad(e.to_string()))?;

        self.params = Some(Params {
            network,
            global_step: metadata.global_step,
            global_episode: metadata.global_episode,
        });
        Ok(())
    }

    /// Gradient updates applied so far (0 until initialized).
    pub fn global_step(&self) -> u64 {
        self.params.as_ref().map_or(0, |p| p.global_step)
    }

    /// Episodes recorded so far (0 until initialized).
    pub fn global_episode(&self) -> u64 {
        self.params.as_ref().map_or(0, |p| p.global_episode)
    }

    pub fn is_initialized(&self) -> bool {
        self.params.is_some()
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    fn validate_states(&self, states: &[Observation]) -> Result<(), EstimatorError> {
        if states.is_empty() {
            return Err(EstimatorError::ShapeMismatch {
                context: "batch size",
                expected: 1,
                actual: 0,
            });
        }
        for obs in states {
            if obs.rows() != self.config.screen_rows {
                return Err(EstimatorError::ShapeMismatch {
                    context: "observation rows",
                    expected: self.config.screen_rows,
                    actual: obs.rows(),
                });
            }
            if obs.cols() != self.config.screen_cols {
                return Err(EstimatorError::ShapeMismatch {
                    context: "observation columns",
                    expected: self.config.screen_cols,
                    actual: obs.cols(),
                });
            }
        }
        Ok(())
    }

    fn validate_batch(
        &self,
        states: &[Observation],
        actions: &[Vec<f32>],
        targets: &[f32],
    ) -> Result<(), EstimatorError> {
        self.validate_states(states)?;
        if actions.len() != states.len() {
            return Err(EstimatorError::ShapeMismatch {
                context: "action batch",
                expected: states.len(),
                actual: actions.len(),
            });
        }
        if targets.len() != states.len() {
            return Err(EstimatorError::ShapeMismatch {
                context: "target batch",
                expected: states.len(),
                actual: targets.len(),
            });
        }
        let cells = self.config.action_len();
        for action in actions {
            if action.len() != cells {
                return Err(EstimatorError::ShapeMismatch {
                    context: "action length",
                    expected: cells,
                    actual: action.len(),
                });
            }
        }
        Ok(())
    }
}

fn summary_io(e: std::io::Error) -> EstimatorError {
    EstimatorError::Persistence(PersistenceError::Io(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use rand::Rng;

    use crate::telemetry::RecordingSummaryWriter;

    /// Test sink sharing its records with the test body.
    struct SharedWriter(Rc<RefCell<RecordingSummaryWriter>>);

    impl SummaryWriter for SharedWriter {
        fn add_scalar(&mut self, tag: &str, value: f32, episode: u64) -> std::io::Result<()> {
            self.0.borrow_mut().add_scalar(tag, value, episode)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.0.borrow_mut().flush()
        }
    }

    fn test_config(rows: usize, cols: usize) -> EstimatorConfig {
        EstimatorConfig {
            screen_rows: rows,
            screen_cols: cols,
            learning_rate: 1e-4,
            ..Default::default()
        }
    }

    fn test_estimator(rows: usize, cols: usize) -> MovementValueEstimator {
        MovementValueEstimator::with_writer(
            test_config(rows, cols),
            Box::new(RecordingSummaryWriter::default()),
        )
    }

    fn one_hot(len: usize, index: usize) -> Vec<f32> {
        let mut v = vec![0.0; len];
        v[index] = 1.0;
        v
    }

    #[test]
    fn test_update_before_init_fails() {
        let mut est = test_estimator(4, 4);
        let err = est
            .update(&[Observation::zeros(4, 4)], &[one_hot(16, 0)], &[0.0])
            .unwrap_err();
        assert!(matches!(err, EstimatorError::Uninitialized));
    }

    #[test]
    fn test_log_summary_before_init_fails() {
        let mut est = test_estimator(4, 4);
        let err = est
            .log_summary(&[Observation::zeros(4, 4)], &[one_hot(16, 0)], &[0.0], 0.0)
            .unwrap_err();
        assert!(matches!(err, EstimatorError::Uninitialized));
    }

    #[test]
    fn test_save_before_init_fails() {
        let dir = tempfile::tempdir().unwrap();
        let est = test_estimator(4, 4);
        let err = est.save(&dir.path().join("ckpt")).unwrap_err();
        assert!(matches!(err, EstimatorError::Uninitialized));
    }

    #[test]
    fn test_update_returns_finite_loss_and_counts_steps() {
        let mut est = test_estimator(4, 4);
        est.initialize_parameters();

        let states = vec![Observation::zeros(4, 4), Observation::zeros(4, 4)];
        let actions = vec![one_hot(16, 3), one_hot(16, 9)];
        let targets = vec![0.5, -0.5];

        for step in 1..=3u64 {
            let loss = est.update(&states, &actions, &targets).unwrap();
            assert!(loss.is_finite());
            assert!(loss >= 0.0);
            assert_eq!(est.global_step(), step);
        }
        assert_eq!(est.global_episode(), 0);
    }

    #[test]
    fn test_update_with_random_batches() {
        let mut est = test_estimator(6, 5);
        est.initialize_parameters();
        let mut rng = rand::rng();

        for _ in 0..5 {
            let states: Vec<Observation> = (0..4)
                .map(|_| {
                    let cells = (0..30).map(|_| rng.random_range(0..5u8)).collect();
                    Observation::new(6, 5, cells).unwrap()
                })
                .collect();
            let actions: Vec<Vec<f32>> = (0..4)
                .map(|_| one_hot(30, rng.random_range(0..30)))
                .collect();
            let targets: Vec<f32> = (0..4).map(|_| rng.random_range(-1.0..1.0)).collect();

            let loss = est.update(&states, &actions, &targets).unwrap();
            assert!(loss.is_finite());
            assert!(loss >= 0.0);
        }
        assert_eq!(est.global_step(), 5);
    }

    #[test]
    fn test_episode_counter_monotonic_and_independent() {
        let mut est = test_estimator(4, 4);
        est.initialize_parameters();

        for n in 1..=5u64 {
            est.increment_episode().unwrap();
            assert_eq!(est.global_episode(), n);
        }

        let states = vec![Observation::zeros(4, 4)];
        est.update(&states, &[one_hot(16, 0)], &[0.0]).unwrap();
        est.update(&states, &[one_hot(16, 0)], &[0.0]).unwrap();
        assert_eq!(est.global_episode(), 5);
        assert_eq!(est.global_step(), 2);

        est.increment_episode().unwrap();
        assert_eq!(est.global_step(), 2);
    }

    #[test]
    fn test_increment_episode_before_init_fails() {
        let mut est = test_estimator(4, 4);
        assert!(matches!(
            est.increment_episode().unwrap_err(),
            EstimatorError::Uninitialized
        ));
    }

    #[test]
    fn test_wrong_action_length_mutates_nothing() {
        let mut est = test_estimator(4, 4);
        est.initialize_parameters();
        let states = vec![Observation::zeros(4, 4)];
        let q_before = est.q_values(&states).unwrap();

        let err = est
            .update(&states, &[vec![0.0; 15]], &[1.0])
            .unwrap_err();
        assert!(matches!(
            err,
            EstimatorError::ShapeMismatch {
                context: "action length",
                expected: 16,
                actual: 15,
            }
        ));

        assert_eq!(est.global_step(), 0);
        assert_eq!(est.q_values(&states).unwrap(), q_before);
    }

    #[test]
    fn test_mismatched_batch_sizes_fail() {
        let mut est = test_estimator(4, 4);
        est.initialize_parameters();
        let states = vec![Observation::zeros(4, 4), Observation::zeros(4, 4)];

        let err = est.update(&states, &[one_hot(16, 0)], &[0.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            EstimatorError::ShapeMismatch {
                context: "action batch",
                ..
            }
        ));

        let err = est
            .update(&states, &[one_hot(16, 0), one_hot(16, 1)], &[0.0])
            .unwrap_err();
        assert!(matches!(
            err,
            EstimatorError::ShapeMismatch {
                context: "target batch",
                ..
            }
        ));
    }

    #[test]
    fn test_wrong_observation_shape_fails() {
        let mut est = test_estimator(4, 4);
        est.initialize_parameters();

        let err = est
            .update(&[Observation::zeros(8, 4)], &[one_hot(16, 0)], &[0.0])
            .unwrap_err();
        assert!(matches!(
            err,
            EstimatorError::ShapeMismatch {
                context: "observation rows",
                ..
            }
        ));
    }

    #[test]
    fn test_empty_batch_fails() {
        let mut est = test_estimator(4, 4);
        est.initialize_parameters();
        let err = est.update(&[], &[], &[]).unwrap_err();
        assert!(matches!(
            err,
            EstimatorError::ShapeMismatch {
                context: "batch size",
                ..
            }
        ));
    }

    #[test]
    fn test_single_update_moves_selected_q_toward_target() {
        let mut est = test_estimator(4, 4);
        est.initialize_parameters();

        let obs = Observation::zeros(4, 4);
        let action = one_hot(16, 5);
        let q_initial = est.q_values(&[obs.clone()]).unwrap()[0][5];

        let loss = est.update(&[obs.clone()], &[action], &[1.0]).unwrap();
        let expected = (1.0 - q_initial) * (1.0 - q_initial);
        assert!(
            (loss - expected).abs() < 1e-5,
            "loss {} != ({} - 1)^2 = {}",
            loss,
            q_initial,
            expected
        );

        let q_after = est.q_values(&[obs]).unwrap()[0][5];
        assert!(
            (1.0 - q_after).abs() < (1.0 - q_initial).abs(),
            "Q[5] did not move toward target: {} -> {}",
            q_initial,
            q_after
        );
    }

    #[test]
    fn test_q_values_shape() {
        let mut est = test_estimator(6, 7);
        est.initialize_parameters();
        let states = vec![Observation::zeros(6, 7), Observation::zeros(6, 7)];
        let q = est.q_values(&states).unwrap();
        assert_eq!(q.len(), 2);
        assert_eq!(q[0].len(), 42);
        assert_eq!(q[1].len(), 42);
    }

    #[test]
    fn test_reinitialize_resets_counters() {
        let mut est = test_estimator(4, 4);
        est.initialize_parameters();
        est.update(&[Observation::zeros(4, 4)], &[one_hot(16, 0)], &[0.0])
            .unwrap();
        est.increment_episode().unwrap();
        assert_eq!(est.global_step(), 1);

        est.initialize_parameters();
        assert_eq!(est.global_step(), 0);
        assert_eq!(est.global_episode(), 0);
    }

    #[test]
    fn test_log_summary_writes_four_series() {
        let records = Rc::new(RefCell::new(RecordingSummaryWriter::default()));
        let mut est = MovementValueEstimator::with_writer(
            test_config(4, 4),
            Box::new(SharedWriter(records.clone())),
        );
        est.initialize_parameters();
        est.increment_episode().unwrap();
        est.increment_episode().unwrap();

        let states = vec![Observation::zeros(4, 4)];
        est.log_summary(&states, &[one_hot(16, 2)], &[0.5], 21.0)
            .unwrap();

        let recorded = records.borrow();
        let tags: Vec<&str> = recorded.scalars.iter().map(|(_, t, _)| t.as_str()).collect();
        assert_eq!(tags, vec!["loss", "score", "batch_max_q", "batch_mean_q"]);
        // Tagged with the most recently completed episode
        assert!(recorded.scalars.iter().all(|(ep, _, _)| *ep == 1));
        assert_eq!(recorded.scalars[1].2, 21.0);
        // Max over the batch is at least the mean
        assert!(recorded.scalars[2].2 >= recorded.scalars[3].2);
        assert_eq!(recorded.flushes, 1);

        // No parameter or counter mutation
        assert_eq!(est.global_step(), 0);
        assert_eq!(est.global_episode(), 2);
    }

    #[test]
    fn test_log_summary_before_any_episode_tags_zero() {
        let records = Rc::new(RefCell::new(RecordingSummaryWriter::default()));
        let mut est = MovementValueEstimator::with_writer(
            test_config(4, 4),
            Box::new(SharedWriter(records.clone())),
        );
        est.initialize_parameters();

        let states = vec![Observation::zeros(4, 4)];
        est.log_summary(&states, &[one_hot(16, 0)], &[0.0], 0.0)
            .unwrap();
        assert!(records.borrow().scalars.iter().all(|(ep, _, _)| *ep == 0));
    }

    #[test]
    fn test_new_opens_summary_stream() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(4, 4);
        config.summary_path = dir.path().join("sum.jsonl");

        let mut est = MovementValueEstimator::new(config).unwrap();
        est.initialize_parameters();
        est.log_summary(&[Observation::zeros(4, 4)], &[one_hot(16, 0)], &[0.0], 1.0)
            .unwrap();

        let content = std::fs::read_to_string(dir.path().join("sum.jsonl")).unwrap();
        assert_eq!(content.lines().count(), 4);
    }

    #[test]
    fn test_save_restore_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = dir.path().join("ckpt");

        let mut a = test_estimator(8, 8);
        a.initialize_parameters();
        let states = vec![Observation::zeros(8, 8)];
        for _ in 0..3 {
            a.update(&states, &[one_hot(64, 10)], &[1.0]).unwrap();
        }
        a.increment_episode().unwrap();
        a.save(&ckpt).unwrap();

        let mut b = test_estimator(8, 8);
        b.restore(&ckpt).unwrap();
        assert_eq!(b.global_step(), 3);
        assert_eq!(b.global_episode(), 1);

        let mut probe = Observation::zeros(8, 8);
        probe.set(2, 3, 1);
        probe.set(5, 6, 4);
        let qa = a.q_values(&[probe.clone()]).unwrap();
        let qb = b.q_values(&[probe]).unwrap();
        for (va, vb) in qa[0].iter().zip(qb[0].iter()) {
            assert!((va - vb).abs() < 1e-6, "{} != {}", va, vb);
        }
    }

    #[test]
    fn test_save_checkpoint_uses_configured_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(4, 4);
        config.checkpoint_dir = dir.path().join("default_ckpt");
        let mut est = MovementValueEstimator::with_writer(
            config,
            Box::new(RecordingSummaryWriter::default()),
        );
        est.initialize_parameters();

        est.save_checkpoint().unwrap();
        assert!(est.config().checkpoint_dir.join("metadata.json").exists());
    }

    #[test]
    fn test_restore_rejects_mismatched_screen() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = dir.path().join("ckpt");

        let mut small = test_estimator(32, 32);
        small.initialize_parameters();
        small.save(&ckpt).unwrap();

        let mut large = test_estimator(64, 64);
        let err = large.restore(&ckpt).unwrap_err();
        assert!(matches!(
            err,
            EstimatorError::Persistence(PersistenceError::SchemaMismatch {
                expected_rows: 64,
                expected_cols: 64,
                found_rows: 32,
                found_cols: 32,
            })
        ));
        assert!(!large.is_initialized());
    }

    #[test]
    fn test_restore_missing_checkpoint_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut est = test_estimator(4, 4);
        let err = est.restore(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(
            err,
            EstimatorError::Persistence(PersistenceError::NotFound(_))
        ));
    }
}
