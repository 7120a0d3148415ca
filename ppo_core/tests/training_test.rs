use std::fs;

use ppo_core::trainers::{run_training, RunFlags, TrainingSettings};

fn small_settings(results_dir: &std::path::Path) -> TrainingSettings {
    let mut settings = TrainingSettings::default();
    settings.run_id = "smoke".to_string();
    settings.seed = Some(3);
    settings.hyperparameters.steps_per_epoch = 64;
    settings.hyperparameters.epochs = 2;
    settings.hyperparameters.train_policy_iterations = 2;
    settings.hyperparameters.train_value_iterations = 2;
    settings.network_settings.hidden_sizes = vec![8];
    settings.checkpoint_settings.results_dir = results_dir.to_path_buf();
    settings.checkpoint_settings.checkpoint_interval = 1;
    settings.checkpoint_settings.keep_checkpoints = 1;
    settings
}

#[test]
fn test_training_run_writes_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let settings = small_settings(dir.path());
    let summaries = run_training(&settings, RunFlags::default()).unwrap();

    assert_eq!(summaries.len(), 2);
    for (i, summary) in summaries.iter().enumerate() {
        assert_eq!(summary.epoch, i as u64 + 1);
        assert!(summary.episodes >= 1);
        assert!(summary.mean_return > 0.0);
        assert!(summary.policy_iterations >= 1 && summary.policy_iterations <= 2);
        assert!(summary.value_loss.is_finite());
    }

    let run_dir = settings.run_dir();
    assert!(run_dir.join("configuration.yaml").exists());
    assert!(run_dir.join("training_status.json").exists());
    assert!(run_dir.join("stats").join("hparams.json").exists());
    let returns = fs::read_to_string(run_dir.join("stats").join("episode_mean_return.csv")).unwrap();
    assert_eq!(returns.lines().count(), 3);

    // keep_checkpoints = 1
    let checkpoints: Vec<_> = fs::read_dir(run_dir.join("checkpoints"))
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(checkpoints, vec!["smoke-2".to_string()]);
}

#[test]
fn test_existing_run_requires_resume_or_force() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = small_settings(dir.path());
    settings.hyperparameters.epochs = 1;
    run_training(&settings, RunFlags::default()).unwrap();
    assert!(run_training(&settings, RunFlags::default()).is_err());

    settings.hyperparameters.epochs = 2;
    let resumed = run_training(&settings, RunFlags { resume: true, force: false }).unwrap();
    assert_eq!(resumed.len(), 1);
    assert_eq!(resumed[0].epoch, 2);

    let forced = run_training(&settings, RunFlags { resume: false, force: true }).unwrap();
    assert_eq!(forced.len(), 2);
}
