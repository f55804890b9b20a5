use crate::config::deploy::{HandlerSpec, PackagingConfig};
use crate::domain::ports::{CommandRunner, Storage};
use crate::utils::error::{AllocError, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::{SimpleFileOptions, ZipWriter};
use zip::{CompressionMethod, DateTime};

/// One archive written by the packager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedArchive {
    pub handler: String,
    pub location: String,
    /// Archive member names, in the order they were written.
    pub entries: Vec<String>,
    pub size: usize,
}

/// Builds one zip per handler from its own staging directory.
pub struct FunctionPackager<S: Storage, R: CommandRunner> {
    config: PackagingConfig,
    storage: S,
    runner: R,
}

impl<S: Storage, R: CommandRunner> FunctionPackager<S, R> {
    pub fn new(config: PackagingConfig, storage: S, runner: R) -> Self {
        Self {
            config,
            storage,
            runner,
        }
    }

    pub fn staging_dir(&self, handler: &HandlerSpec) -> PathBuf {
        self.config.build_dir.join(&handler.name)
    }

    pub async fn run(&self) -> Result<Vec<PackagedArchive>> {
        tracing::info!(
            "📦 Packaging {} handlers into {}",
            self.config.handlers.len(),
            self.config.build_dir.display()
        );
        self.wipe_build_dir()?;

        let mut archives = Vec::with_capacity(self.config.handlers.len());
        for handler in &self.config.handlers {
            archives.push(self.package(handler).await?);
        }
        Ok(archives)
    }

    async fn package(&self, handler: &HandlerSpec) -> Result<PackagedArchive> {
        let staging = self.staging_dir(handler);
        fs::create_dir_all(&staging).map_err(|e| step_error("create staging directory", &staging, e))?;

        let entry_name = handler.entry_name()?;
        let destination = staging.join(&entry_name);
        fs::copy(&handler.source, &destination)
            .map_err(|e| step_error(&format!("copy {}", handler.name), &handler.source, e))?;
        tracing::debug!(
            "Copied {} -> {}",
            handler.source.display(),
            destination.display()
        );

        if !handler.dependencies.is_empty() {
            let target = staging.to_string_lossy().into_owned();
            let mut installer = self.config.installer.clone();
            installer.description = format!("install {} dependencies", handler.name);
            installer.args = installer
                .args
                .iter()
                .map(|arg| arg.replace("{target}", &target))
                .collect();
            installer.args.extend(handler.dependencies.iter().cloned());
            self.runner.run(&installer)?;
        }

        let (data, entries) = zip_directory(&staging)?;
        let archive_name = handler.archive_name();
        self.storage.write_file(&archive_name, &data).await?;
        let location = self.storage.location(&archive_name);
        tracing::info!(
            "✅ {} ({} entries, {} bytes)",
            location,
            entries.len(),
            data.len()
        );

        Ok(PackagedArchive {
            handler: handler.name.clone(),
            location,
            entries,
            size: data.len(),
        })
    }

    fn wipe_build_dir(&self) -> Result<()> {
        let dir = &self.config.build_dir;
        if dir.exists() {
            fs::remove_dir_all(dir).map_err(|e| step_error("wipe build directory", dir, e))?;
        }
        fs::create_dir_all(dir).map_err(|e| step_error("create build directory", dir, e))?;
        Ok(())
    }
}

fn step_error(step: &str, path: &Path, e: std::io::Error) -> AllocError {
    AllocError::StepFailed {
        step: step.to_string(),
        detail: format!("{}: {}", path.display(), e),
    }
}

struct Member {
    name: String,
    path: PathBuf,
    is_dir: bool,
}

fn collect_members(root: &Path, dir: &Path, members: &mut Vec<Member>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let relative = path
            .strip_prefix(root)
            .map_err(|e| AllocError::StateError {
                message: format!("{} is outside {}: {}", path.display(), root.display(), e),
            })?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        if path.is_dir() {
            members.push(Member {
                name: format!("{}/", relative),
                path: path.clone(),
                is_dir: true,
            });
            collect_members(root, &path, members)?;
        } else {
            members.push(Member {
                name: relative,
                path,
                is_dir: false,
            });
        }
    }
    Ok(())
}

#[cfg(unix)]
fn file_mode(path: &Path) -> Result<u32> {
    use std::os::unix::fs::PermissionsExt;
    Ok(fs::metadata(path)?.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> Result<u32> {
    Ok(0o644)
}

/// Zips everything under `dir`. Entries are sorted and stamped with a fixed
/// time, so the same directory always gives the same bytes.
pub fn zip_directory(dir: &Path) -> Result<(Vec<u8>, Vec<String>)> {
    let mut members = Vec::new();
    collect_members(dir, dir, &mut members)?;
    members.sort_by(|a, b| a.name.cmp(&b.name));

    let base_options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());

    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for member in &members {
        if member.is_dir {
            zip.add_directory(member.name.as_str(), base_options.unix_permissions(0o755))?;
        } else {
            let options = base_options.unix_permissions(file_mode(&member.path)?);
            zip.start_file(member.name.as_str(), options)?;
            zip.write_all(&fs::read(&member.path)?)?;
        }
    }
    let cursor = zip.finish()?;

    Ok((
        cursor.into_inner(),
        members.into_iter().map(|m| m.name).collect(),
    ))
}
