use cloud_alloc::config::deploy::{HandlerSpec, PackagingConfig};
use cloud_alloc::deploy::DryRunRunner;
use cloud_alloc::domain::model::CommandSpec;
use cloud_alloc::domain::ports::CommandRunner;
use cloud_alloc::{AllocError, FunctionPackager, LocalStorage, Result};
use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn write_sources(root: &Path) {
    let src = root.join("lambda_src");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("submission_handler.py"), "def lambda_handler(e, c):\n    pass\n").unwrap();
    fs::write(src.join("get_and_send.py"), "def lambda_handler(e, c):\n    pass\n").unwrap();
}

fn packaging_config(root: &Path) -> PackagingConfig {
    PackagingConfig {
        build_dir: root.join("build"),
        output_dir: root.join("dist"),
        handlers: vec![
            HandlerSpec::new(
                "submission_handler",
                root.join("lambda_src/submission_handler.py"),
            ),
            HandlerSpec::new("get_and_send", root.join("lambda_src/get_and_send.py")),
        ],
        ..PackagingConfig::default()
    }
}

fn archive_members(path: &Path) -> Vec<String> {
    let data = fs::read(path).unwrap();
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(data)).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

#[tokio::test]
async fn test_archives_are_named_after_handlers() {
    let temp = TempDir::new().unwrap();
    write_sources(temp.path());
    let config = packaging_config(temp.path());
    let storage = LocalStorage::new(config.output_dir.clone());
    let packager = FunctionPackager::new(config, storage, DryRunRunner);

    let archives = packager.run().await.unwrap();

    assert_eq!(archives.len(), 2);
    for (archive, name) in archives.iter().zip(["submission_handler", "get_and_send"]) {
        assert_eq!(archive.handler, name);
        let path = temp.path().join("dist").join(format!("{}.zip", name));
        assert!(path.exists());
        assert_eq!(archive_members(&path), vec![format!("{}.py", name)]);
    }

    // 來源內容原封不動
    let data = fs::read(temp.path().join("dist/get_and_send.zip")).unwrap();
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(data)).unwrap();
    let mut content = String::new();
    archive
        .by_name("get_and_send.py")
        .unwrap()
        .read_to_string(&mut content)
        .unwrap();
    assert!(content.contains("lambda_handler"));
}

#[tokio::test]
async fn test_two_runs_produce_identical_archives() {
    let temp = TempDir::new().unwrap();
    write_sources(temp.path());
    let config = packaging_config(temp.path());
    let dist = config.output_dir.clone();

    let packager = FunctionPackager::new(config, LocalStorage::new(dist.clone()), DryRunRunner);

    packager.run().await.unwrap();
    let first_bytes = fs::read(dist.join("submission_handler.zip")).unwrap();
    let first_members = archive_members(&dist.join("get_and_send.zip"));

    packager.run().await.unwrap();
    let second_bytes = fs::read(dist.join("submission_handler.zip")).unwrap();
    let second_members = archive_members(&dist.join("get_and_send.zip"));

    assert_eq!(first_members, second_members);
    assert_eq!(first_bytes, second_bytes);
}

#[tokio::test]
async fn test_build_dir_is_wiped_at_start() {
    let temp = TempDir::new().unwrap();
    write_sources(temp.path());
    let config = packaging_config(temp.path());
    let stale = config.build_dir.join("submission_handler").join("stale.py");
    fs::create_dir_all(stale.parent().unwrap()).unwrap();
    fs::write(&stale, "old").unwrap();

    let dist = config.output_dir.clone();
    let packager = FunctionPackager::new(config, LocalStorage::new(dist.clone()), DryRunRunner);
    packager.run().await.unwrap();

    assert!(!stale.exists());
    assert_eq!(
        archive_members(&dist.join("submission_handler.zip")),
        vec!["submission_handler.py"]
    );
}

#[tokio::test]
async fn test_missing_handler_source_fails() {
    let temp = TempDir::new().unwrap();
    let config = packaging_config(temp.path());
    let dist = config.output_dir.clone();
    let packager = FunctionPackager::new(config, LocalStorage::new(dist.clone()), DryRunRunner);

    let err = packager.run().await.unwrap_err();
    assert!(err.to_string().contains("copy submission_handler"));
    assert!(!dist.join("submission_handler.zip").exists());
}

/// 指定描述的步驟以非零狀態結束
#[derive(Clone, Default)]
struct FailingInstaller {
    fail_on: String,
    calls: Arc<Mutex<Vec<String>>>,
}

impl CommandRunner for FailingInstaller {
    fn run(&self, command: &CommandSpec) -> Result<()> {
        self.calls.lock().unwrap().push(command.description.clone());
        if command.description == self.fail_on {
            return Err(AllocError::StepFailed {
                step: command.description.clone(),
                detail: "exit status: 1".to_string(),
            });
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_install_failure_aborts_and_keeps_earlier_archives() {
    let temp = TempDir::new().unwrap();
    write_sources(temp.path());
    let mut config = packaging_config(temp.path());
    config.handlers[1] = config.handlers[1].clone().with_dependencies(["requests"]);
    let dist = config.output_dir.clone();

    let runner = FailingInstaller {
        fail_on: "install get_and_send dependencies".to_string(),
        ..FailingInstaller::default()
    };
    let packager = FunctionPackager::new(config, LocalStorage::new(dist.clone()), runner.clone());

    let err = packager.run().await.unwrap_err();
    match err {
        AllocError::StepFailed { step, .. } => {
            assert_eq!(step, "install get_and_send dependencies")
        }
        other => panic!("unexpected error: {:?}", other),
    }

    // 已完成的封存不會被清掉
    assert_eq!(
        archive_members(&dist.join("submission_handler.zip")),
        vec!["submission_handler.py"]
    );
    assert!(!dist.join("get_and_send.zip").exists());
    assert_eq!(
        *runner.calls.lock().unwrap(),
        vec!["install get_and_send dependencies"]
    );
}
