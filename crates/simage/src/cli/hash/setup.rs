//! Hash setup: config overrides, record store location, discovery.

use simage_core::pipeline::{exclude_known, FileDiscovery};
use simage_core::{load_known_paths, Config};
use std::path::PathBuf;

use super::{HashArgs, HashContext};

/// Validate input, apply CLI overrides, and find the images to hash.
pub fn setup_hash(args: &HashArgs, config: Config) -> anyhow::Result<HashContext> {
    if !args.input.exists() {
        anyhow::bail!(
            "Input path does not exist: {:?}\n\n  Hint: Check the file path and try again.",
            args.input
        );
    }

    let config = apply_overrides(config, args)?;
    let output = resolve_output(args, &config);

    let files = FileDiscovery::new(config.scan.clone()).discover(&args.input);
    let found = files.len();
    let files = if args.rescan {
        files
    } else {
        let known = load_known_paths(&output)?;
        if !known.is_empty() {
            tracing::debug!("Loaded {} known paths from {:?}", known.len(), output);
        }
        exclude_known(files, &known)
    };
    let skipped = found - files.len();

    Ok(HashContext {
        config,
        output,
        files,
        skipped,
    })
}

/// Apply command-line overrides and re-validate.
fn apply_overrides(mut config: Config, args: &HashArgs) -> anyhow::Result<Config> {
    if let Some(workers) = args.workers {
        config.pool.workers = workers;
    }
    if let Some(queue_size) = args.queue_size {
        config.pool.max_queue_size = queue_size;
    }
    if let Some(batch_size) = args.batch_size {
        config.pool.batch_size = batch_size;
    }
    config.validate()?;
    Ok(config)
}

fn resolve_output(args: &HashArgs, config: &Config) -> PathBuf {
    match &args.output {
        Some(path) => {
            let path_str = path.to_string_lossy();
            PathBuf::from(shellexpand::tilde(&path_str).into_owned())
        }
        None => config.output_path(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simage_core::{HashRecord, JsonlSink, RecordSink};

    fn args(input: PathBuf, output: PathBuf) -> HashArgs {
        HashArgs {
            input,
            output: Some(output),
            workers: None,
            queue_size: None,
            batch_size: None,
            rescan: false,
            distributed: false,
        }
    }

    #[test]
    fn test_overrides_applied() {
        let mut a = args(PathBuf::from("."), PathBuf::from("out.jsonl"));
        a.workers = Some(2);
        a.queue_size = Some(3);
        a.batch_size = Some(4);

        let config = apply_overrides(Config::default(), &a).unwrap();
        assert_eq!(config.pool.workers, 2);
        assert_eq!(config.pool.max_queue_size, 3);
        assert_eq!(config.pool.batch_size, 4);
    }

    #[test]
    fn test_zero_queue_size_rejected() {
        let mut a = args(PathBuf::from("."), PathBuf::from("out.jsonl"));
        a.queue_size = Some(0);
        assert!(apply_overrides(Config::default(), &a).is_err());
    }

    #[test]
    fn test_missing_input_fails() {
        let a = args(PathBuf::from("/no/such/dir"), PathBuf::from("out.jsonl"));
        assert!(setup_hash(&a, Config::default()).is_err());
    }

    #[test]
    fn test_known_paths_skipped_unless_rescan() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("images");
        std::fs::create_dir(&images).unwrap();
        let seen = images.join("seen.png");
        let fresh = images.join("fresh.png");
        std::fs::write(&seen, b"x").unwrap();
        std::fs::write(&fresh, b"x").unwrap();

        let store = dir.path().join("hashes.jsonl");
        let sink = JsonlSink::open(&store).unwrap();
        sink.add(vec![HashRecord::new(seen.clone(), 1)]);
        sink.shutdown();

        let mut a = args(images.clone(), store);
        let ctx = setup_hash(&a, Config::default()).unwrap();
        assert_eq!(ctx.skipped, 1);
        assert_eq!(ctx.files.len(), 1);
        assert_eq!(ctx.files[0].path, fresh);

        a.rescan = true;
        let ctx = setup_hash(&a, Config::default()).unwrap();
        assert_eq!(ctx.skipped, 0);
        assert_eq!(ctx.files.len(), 2);
    }
}
