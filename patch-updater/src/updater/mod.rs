//! Update state machine.
//!
//! [`Updater`] owns the current [`UpdateState`] and sequences one cycle:
//!
//! ```text
//! NONE -> SETUP                           no usable installation directory
//! NONE/SETUP -> GET_MANIFEST              valid installation directory
//! GET_MANIFEST -> VERIFYING_INTEGRITY     manifest fetched
//! VERIFYING_INTEGRITY -> REQUIRES_ELEVATION | DOWNLOADING | UPDATE_AVAILABLE | DONE
//! UPDATE_AVAILABLE -> DOWNLOADING         user accepts
//! DOWNLOADING -> VERIFYING_INTEGRITY      batch finished or cancelled
//! * -> GET_MANIFEST                       manual refresh
//! ```
//!
//! It is the only writer of the state and of the pending updatable-file set.
//! Every [`Updater::set_state`] call notifies subscribers, even if the state did
//! not change.

pub mod state;

pub use state::UpdateState;

use crate::config::Config;
use crate::download::{CancelHandle, DownloadOrchestrator, DownloadOutcome};
use crate::events::{EventBus, UpdateEvent};
use crate::fs::installation::WriteCheck;
use crate::fs::ClientInstallation;
use crate::integrity::{Classification, IntegrityChecker, UpdatableFileSet};
use crate::manifest::{Manifest, ManifestClient};
use crate::settings::{SettingKey, SettingsStore};
use crate::utils::errors::{Result, UpdaterError};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Everything the updater needs from its host.
#[derive(Clone)]
pub struct UpdaterContext {
    pub config: Config,
    pub settings: Arc<dyn SettingsStore>,
    pub events: EventBus,
}

/// A verified manifest together with the files it still needs.
#[derive(Debug, Clone)]
struct PendingUpdate {
    manifest: Arc<Manifest>,
    installation: ClientInstallation,
    files: UpdatableFileSet,
}

pub struct Updater {
    settings: Arc<dyn SettingsStore>,
    events: EventBus,
    manifest_client: ManifestClient,
    checker: IntegrityChecker,
    downloader: DownloadOrchestrator,
    cancel: CancelHandle,
    write_check: Option<WriteCheck>,
    state: Mutex<UpdateState>,
    pending: Mutex<Option<PendingUpdate>>,
    /// Serializes cycles; `cancel` never waits on it.
    cycle: tokio::sync::Mutex<()>,
}

impl Updater {
    pub fn new(context: UpdaterContext) -> Result<Self> {
        let UpdaterContext {
            config,
            settings,
            events,
        } = context;
        let downloader = DownloadOrchestrator::new(&config.download, events.clone())?;

        Ok(Self {
            cancel: downloader.cancel_handle(),
            downloader,
            manifest_client: ManifestClient::new(config.manifest.clone())?,
            checker: IntegrityChecker::new(events.clone()),
            write_check: None,
            settings,
            events,
            state: Mutex::new(UpdateState::None),
            pending: Mutex::new(None),
            cycle: tokio::sync::Mutex::new(()),
        })
    }

    /// Use `check` instead of the OS permission check when deciding whether an
    /// installation requires elevation.
    pub fn with_write_check(mut self, check: WriteCheck) -> Self {
        self.write_check = Some(check);
        self
    }

    pub fn state(&self) -> UpdateState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
        self.events.subscribe()
    }

    /// Files the last integrity pass found stale, if an update is on offer.
    pub fn pending(&self) -> Option<UpdatableFileSet> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|p| p.files.clone())
    }

    /// Set the state and notify, unconditionally.
    pub fn set_state(&self, state: UpdateState) {
        let previous = std::mem::replace(
            &mut *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            state,
        );
        if previous != state {
            info!("Update state: {} -> {}", previous, state);
        }
        self.events.broadcast(UpdateEvent::StateChanged { state });
    }

    /// Re-broadcast the current state so a (re)connected observer can catch up.
    pub fn resend_state(&self) {
        self.set_state(self.state());
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Cancel the current cycle. A running batch stops and the cycle continues
    /// with a re-verification; a cycle that has not started downloading yet will
    /// not start.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Begin a cycle from the persisted settings.
    pub async fn start(&self) -> Result<UpdateState> {
        match self.installation() {
            Some(installation) if installation.is_usable() => self.refresh().await,
            Some(installation) => {
                info!(
                    "Configured client directory {} is not usable",
                    installation.root().display()
                );
                self.set_state(UpdateState::Setup);
                Ok(UpdateState::Setup)
            }
            None => {
                info!("No client directory configured");
                self.set_state(UpdateState::Setup);
                Ok(UpdateState::Setup)
            }
        }
    }

    /// Validate and persist a directory picked by the user, then start a cycle.
    ///
    /// A rejected directory is reported with `invalid-directory-chosen` and
    /// leaves the state as it was.
    pub async fn choose_directory(&self, path: &Path) -> Result<UpdateState> {
        let installation = self.open_installation(path);

        if let Err(rejection) = installation.validate() {
            warn!("Rejected client directory {}: {:?}", path.display(), rejection);
            self.events.broadcast(UpdateEvent::InvalidDirectoryChosen {
                message: rejection.message().to_string(),
            });
            return Ok(self.state());
        }

        let path = path.to_string_lossy().into_owned();
        self.settings.set(SettingKey::ClientDirectory, &path)?;
        info!("Client directory set to {}", path);
        self.events
            .broadcast(UpdateEvent::ValidDirectoryChosen { path });

        self.refresh().await
    }

    /// Fetch the manifest and verify the installation against it.
    ///
    /// A manifest that cannot be fetched or parsed is logged and leaves the
    /// cycle in `GET_MANIFEST`.
    pub async fn refresh(&self) -> Result<UpdateState> {
        let _cycle = self.cycle.lock().await;
        let cancel = self.cancel.reset();
        self.clear_pending();

        let Some(installation) = self.installation() else {
            self.set_state(UpdateState::Setup);
            return Ok(UpdateState::Setup);
        };

        self.set_state(UpdateState::GetManifest);

        let environment = self.settings.get(SettingKey::Environment);
        let key = self.settings.get(SettingKey::Key);
        let manifest = match self.manifest_client.fetch(&environment, &key).await {
            Ok(manifest) => Arc::new(manifest),
            Err(e) => {
                error!("Failed to retrieve manifest: {}", e);
                return Ok(UpdateState::GetManifest);
            }
        };

        self.verify(manifest, installation, true, &cancel).await
    }

    /// Download the pending update. Ignored unless the state is `UPDATE_AVAILABLE`.
    pub async fn accept_update(&self) -> Result<UpdateState> {
        let _cycle = self.cycle.lock().await;

        let state = self.state();
        if state != UpdateState::UpdateAvailable {
            warn!("No update to accept in state {}", state);
            return Ok(state);
        }

        let Some(pending) = self.take_pending() else {
            warn!("Update available but nothing pending, refresh required");
            return Ok(state);
        };

        let cancel = self.cancel.reset();
        if !self
            .download(&pending.files, &pending.installation, &cancel)
            .await
        {
            return Ok(UpdateState::RequiresElevation);
        }
        self.verify(pending.manifest, pending.installation, false, &cancel)
            .await
    }

    /// Integrity pass, plus the automatic download of a fresh install.
    ///
    /// After a download the installation is verified once more; what is still
    /// stale at that point is offered as an update rather than downloaded again.
    async fn verify(
        &self,
        manifest: Arc<Manifest>,
        installation: ClientInstallation,
        mut auto_download: bool,
        cancel: &CancellationToken,
    ) -> Result<UpdateState> {
        loop {
            self.set_state(UpdateState::VerifyingIntegrity);

            let report = match self.checker.check(&manifest, &installation).await {
                Ok(report) => report,
                Err(UpdaterError::ElevationRequired(_)) => {
                    self.set_state(UpdateState::RequiresElevation);
                    return Ok(UpdateState::RequiresElevation);
                }
                Err(e) => return Err(e),
            };

            match report.classification {
                Classification::UpToDate => {
                    info!("Client is up to date (manifest v{})", manifest.version);
                    self.set_state(UpdateState::Done);
                    return Ok(UpdateState::Done);
                }
                Classification::FreshInstall if auto_download && !cancel.is_cancelled() => {
                    auto_download = false;
                    if !self.download(&report.updatable, &installation, cancel).await {
                        return Ok(UpdateState::RequiresElevation);
                    }
                }
                _ => {
                    info!(
                        "Update available: {} files, {} bytes",
                        report.updatable.len(),
                        report.updatable.total_bytes()
                    );
                    self.store_pending(PendingUpdate {
                        manifest: Arc::clone(&manifest),
                        installation: installation.clone(),
                        files: report.updatable,
                    });
                    self.set_state(UpdateState::UpdateAvailable);
                    return Ok(UpdateState::UpdateAvailable);
                }
            }
        }
    }

    /// Run one download batch. Returns false if the cycle stopped at
    /// `REQUIRES_ELEVATION`.
    async fn download(
        &self,
        files: &UpdatableFileSet,
        installation: &ClientInstallation,
        cancel: &CancellationToken,
    ) -> bool {
        self.set_state(UpdateState::Downloading);

        match self
            .downloader
            .download_all(files, installation, cancel)
            .await
        {
            Ok(outcome) => {
                log_outcome(&outcome);
                true
            }
            Err(UpdaterError::ElevationRequired(_)) => {
                self.set_state(UpdateState::RequiresElevation);
                false
            }
            Err(e) => {
                error!("Download batch aborted: {}", e);
                true
            }
        }
    }

    fn installation(&self) -> Option<ClientInstallation> {
        let dir = self.settings.get(SettingKey::ClientDirectory);
        (!dir.is_empty()).then(|| self.open_installation(dir))
    }

    fn open_installation(&self, root: impl Into<std::path::PathBuf>) -> ClientInstallation {
        let installation = ClientInstallation::new(root);
        match self.write_check {
            Some(check) => installation.with_write_check(check),
            None => installation,
        }
    }

    fn store_pending(&self, pending: PendingUpdate) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(pending);
    }

    fn take_pending(&self) -> Option<PendingUpdate> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn clear_pending(&self) {
        self.take_pending();
    }
}

fn log_outcome(outcome: &DownloadOutcome) {
    if outcome.cancelled {
        info!(
            "Download cancelled after {} files, {} skipped",
            outcome.downloaded, outcome.skipped
        );
    } else if !outcome.failed.is_empty() {
        warn!(
            "Downloaded {} files, {} failed",
            outcome.downloaded,
            outcome.failed.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DownloadConfig, ManifestConfig};
    use crate::settings::MemorySettings;
    use mockito::{Matcher, Server, ServerGuard};
    use std::io::Write;
    use tempfile::TempDir;

    fn test_config(server: &ServerGuard) -> Config {
        Config {
            manifest: ManifestConfig {
                development: true,
                development_host: server.host_with_port(),
                timeout_secs: 5,
                ..ManifestConfig::default()
            },
            download: DownloadConfig {
                timeout_secs: 10,
                connect_timeout_secs: 5,
                max_retries: 1,
                retry_delay_ms: 10,
                progress_interval_ms: 0,
            },
            ..Config::default()
        }
    }

    fn updater_for(server: &ServerGuard, client_dir: Option<&Path>) -> Result<Updater> {
        let mut settings = MemorySettings::new().with(SettingKey::Key, "secret");
        if let Some(dir) = client_dir {
            settings = settings.with(SettingKey::ClientDirectory, &dir.to_string_lossy());
        }
        Updater::new(UpdaterContext {
            config: test_config(server),
            settings: Arc::new(settings),
            events: EventBus::new(),
        })
    }

    async fn serve_manifest(server: &mut ServerGuard, body: String) -> mockito::Mock {
        server
            .mock("GET", "/api/manifest")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("environment".into(), "production".into()),
                Matcher::UrlEncoded("internal_key".into(), "secret".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await
    }

    fn states(rx: &mut broadcast::Receiver<UpdateEvent>) -> Vec<UpdateState> {
        let mut states = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let UpdateEvent::StateChanged { state } = event {
                states.push(state);
            }
        }
        states
    }

    /// An installed client: data directory plus marker archive.
    fn game_dir() -> std::io::Result<TempDir> {
        let dir = TempDir::new()?;
        std::fs::create_dir_all(dir.path().join("Data/enUS"))?;
        std::fs::write(dir.path().join("Data/lichking.MPQ"), b"marker")?;
        std::fs::write(dir.path().join("Data/enUS/locale-enUS.MPQ"), b"locale")?;
        Ok(dir)
    }

    #[tokio::test]
    async fn test_fresh_install_downloads_and_finishes() -> Result<()> {
        let mut server = Server::new_async().await;
        let manifest = format!(
            r#"{{"Version":"1.0","Files":[{{"Path":"Data\\a.MPQ","Hash":"","Size":1000,"Custom":false,"URL":"{}/files/a.MPQ"}}]}}"#,
            server.url()
        );
        let _manifest = serve_manifest(&mut server, manifest).await;
        let file = server
            .mock("GET", "/files/a.MPQ")
            .with_status(200)
            .with_body(vec![7u8; 1000])
            .expect(1)
            .create_async()
            .await;

        let install = TempDir::new()?;
        let updater = updater_for(&server, Some(install.path()))?;
        let mut rx = updater.subscribe();

        let state = updater.start().await?;

        file.assert_async().await;
        assert_eq!(state, UpdateState::Done);
        assert_eq!(updater.state(), UpdateState::Done);
        assert_eq!(std::fs::metadata(install.path().join("Data/a.MPQ"))?.len(), 1000);
        assert_eq!(
            states(&mut rx),
            vec![
                UpdateState::GetManifest,
                UpdateState::VerifyingIntegrity,
                UpdateState::Downloading,
                UpdateState::VerifyingIntegrity,
                UpdateState::Done,
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_partial_update_waits_for_accept() -> Result<()> {
        let mut server = Server::new_async().await;
        let manifest = format!(
            r#"{{"Version":"2","Files":[
                {{"Path":"Data/a.MPQ","Size":3,"URL":"{url}/files/a.MPQ"}},
                {{"Path":"Data/b.MPQ","Size":4,"URL":"{url}/files/b.MPQ"}}]}}"#,
            url = server.url()
        );
        let _manifest = serve_manifest(&mut server, manifest).await;
        let untouched = server
            .mock("GET", "/files/a.MPQ")
            .expect(0)
            .create_async()
            .await;
        let missing = server
            .mock("GET", "/files/b.MPQ")
            .with_status(200)
            .with_body(b"bbbb")
            .expect(1)
            .create_async()
            .await;

        let install = game_dir()?;
        std::fs::write(install.path().join("Data/a.MPQ"), b"aaa")?;

        let updater = updater_for(&server, Some(install.path()))?;
        let mut rx = updater.subscribe();

        assert_eq!(updater.start().await?, UpdateState::UpdateAvailable);
        let pending = updater.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.as_slice()[0].relative_path, Path::new("Data").join("b.MPQ"));

        assert_eq!(updater.accept_update().await?, UpdateState::Done);
        assert!(updater.pending().is_none());

        untouched.assert_async().await;
        missing.assert_async().await;
        assert_eq!(std::fs::read(install.path().join("Data/b.MPQ"))?, b"bbbb");
        assert_eq!(
            states(&mut rx),
            vec![
                UpdateState::GetManifest,
                UpdateState::VerifyingIntegrity,
                UpdateState::UpdateAvailable,
                UpdateState::Downloading,
                UpdateState::VerifyingIntegrity,
                UpdateState::Done,
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_accept_outside_update_available_is_ignored() -> Result<()> {
        let server = Server::new_async().await;
        let updater = updater_for(&server, None)?;
        let mut rx = updater.subscribe();

        assert_eq!(updater.accept_update().await?, UpdateState::None);
        assert!(states(&mut rx).is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_manifest_server_error_stays_in_get_manifest() -> Result<()> {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/manifest")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let install = TempDir::new()?;
        let updater = updater_for(&server, Some(install.path()))?;
        let mut rx = updater.subscribe();

        assert_eq!(updater.start().await?, UpdateState::GetManifest);
        assert_eq!(updater.state(), UpdateState::GetManifest);
        assert_eq!(states(&mut rx), vec![UpdateState::GetManifest]);
        Ok(())
    }

    #[tokio::test]
    async fn test_manifest_without_version_does_not_advance() -> Result<()> {
        let mut server = Server::new_async().await;
        let _m = serve_manifest(&mut server, r#"{"Files":[]}"#.to_string()).await;

        let install = TempDir::new()?;
        let updater = updater_for(&server, Some(install.path()))?;

        assert_eq!(updater.start().await?, UpdateState::GetManifest);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_directory_goes_to_setup() -> Result<()> {
        let server = Server::new_async().await;

        let updater = updater_for(&server, None)?;
        assert_eq!(updater.start().await?, UpdateState::Setup);

        let updater = updater_for(&server, Some(Path::new("/nonexistent/wow")))?;
        assert_eq!(updater.start().await?, UpdateState::Setup);
        Ok(())
    }

    #[tokio::test]
    async fn test_non_game_directory_goes_to_setup() -> Result<()> {
        let server = Server::new_async().await;
        let dir = TempDir::new()?;
        std::fs::write(dir.path().join("notes.txt"), b"hello")?;

        let updater = updater_for(&server, Some(dir.path()))?;
        assert_eq!(updater.start().await?, UpdateState::Setup);
        Ok(())
    }

    #[tokio::test]
    async fn test_set_state_always_notifies() -> Result<()> {
        let server = Server::new_async().await;
        let updater = updater_for(&server, None)?;
        let mut rx = updater.subscribe();

        updater.set_state(UpdateState::Done);
        updater.set_state(UpdateState::Done);
        updater.resend_state();

        assert_eq!(
            states(&mut rx),
            vec![UpdateState::Done, UpdateState::Done, UpdateState::Done]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_directory_choice_keeps_state() -> Result<()> {
        let server = Server::new_async().await;
        let updater = updater_for(&server, None)?;
        updater.set_state(UpdateState::Setup);
        let mut rx = updater.subscribe();

        let dir = TempDir::new()?;
        std::fs::write(dir.path().join("notes.txt"), b"hello")?;

        assert_eq!(updater.choose_directory(dir.path()).await?, UpdateState::Setup);
        assert_eq!(updater.state(), UpdateState::Setup);

        let event = rx.try_recv().unwrap();
        assert!(matches!(event, UpdateEvent::InvalidDirectoryChosen { .. }));
        assert!(rx.try_recv().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_wrong_locale_is_rejected() -> Result<()> {
        let server = Server::new_async().await;
        let updater = updater_for(&server, None)?;
        let mut rx = updater.subscribe();

        let dir = game_dir()?;
        std::fs::remove_dir_all(dir.path().join("Data/enUS"))?;

        updater.choose_directory(dir.path()).await?;
        assert_eq!(
            rx.try_recv().unwrap(),
            UpdateEvent::InvalidDirectoryChosen {
                message: crate::fs::DirectoryRejection::WrongLocale.message().to_string()
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_valid_directory_choice_is_persisted_and_starts_cycle() -> Result<()> {
        let mut server = Server::new_async().await;
        let _m = serve_manifest(&mut server, r#"{"Version":"3","Files":[]}"#.to_string()).await;

        let settings = Arc::new(MemorySettings::new().with(SettingKey::Key, "secret"));
        let updater = Updater::new(UpdaterContext {
            config: test_config(&server),
            settings: settings.clone(),
            events: EventBus::new(),
        })?;
        let mut rx = updater.subscribe();

        let dir = TempDir::new()?;
        let state = updater.choose_directory(dir.path()).await?;

        assert_eq!(state, UpdateState::Done);
        assert_eq!(
            settings.get(SettingKey::ClientDirectory),
            dir.path().to_string_lossy()
        );
        assert!(matches!(
            rx.try_recv().unwrap(),
            UpdateEvent::ValidDirectoryChosen { .. }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_fresh_install_is_reverified_and_offered() -> Result<()> {
        let mut server = Server::new_async().await;
        let manifest = format!(
            r#"{{"Version":"1","Files":[
                {{"Path":"Data/a.MPQ","Size":100,"URL":"{url}/files/a.MPQ"}},
                {{"Path":"Data/b.MPQ","Size":100,"URL":"{url}/files/b.MPQ"}}]}}"#,
            url = server.url()
        );
        let _manifest = serve_manifest(&mut server, manifest).await;
        let _slow = server
            .mock("GET", "/files/a.MPQ")
            .with_status(200)
            .with_chunked_body(|w| {
                w.write_all(&[1u8; 10])?;
                std::thread::sleep(std::time::Duration::from_secs(2));
                w.write_all(&[1u8; 90])
            })
            .create_async()
            .await;
        let never = server
            .mock("GET", "/files/b.MPQ")
            .expect(0)
            .create_async()
            .await;

        let install = TempDir::new()?;
        let updater = updater_for(&server, Some(install.path()))?;
        let handle = updater.cancel_handle();
        let mut listener = updater.subscribe();
        let mut rx = updater.subscribe();

        let canceller = tokio::spawn(async move {
            while let Ok(event) = listener.recv().await {
                if let UpdateEvent::DownloadStarted { index: 0, .. } = event {
                    handle.cancel();
                    break;
                }
            }
        });

        let state = updater.start().await?;
        canceller.await.unwrap();

        never.assert_async().await;
        assert_eq!(state, UpdateState::UpdateAvailable);
        assert_eq!(updater.pending().map(|p| p.len()), Some(2));
        assert!(!install.path().join("Data/a.MPQ.part").exists());
        assert_eq!(
            states(&mut rx),
            vec![
                UpdateState::GetManifest,
                UpdateState::VerifyingIntegrity,
                UpdateState::Downloading,
                UpdateState::VerifyingIntegrity,
                UpdateState::UpdateAvailable,
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_while_verifying_prevents_fresh_install_download() -> Result<()> {
        let mut server = Server::new_async().await;
        let manifest = format!(
            r#"{{"Version":"1","Files":[
                {{"Path":"Data/a.MPQ","Size":10,"URL":"{url}/files/a.MPQ"}},
                {{"Path":"Data/b.MPQ","Size":10,"URL":"{url}/files/b.MPQ"}}]}}"#,
            url = server.url()
        );
        let _manifest = serve_manifest(&mut server, manifest).await;
        let a = server.mock("GET", "/files/a.MPQ").expect(0).create_async().await;
        let b = server.mock("GET", "/files/b.MPQ").expect(0).create_async().await;

        let install = TempDir::new()?;
        let updater = updater_for(&server, Some(install.path()))?;
        let handle = updater.cancel_handle();
        let mut listener = updater.subscribe();
        let mut rx = updater.subscribe();

        let canceller = tokio::spawn(async move {
            while let Ok(event) = listener.recv().await {
                if let UpdateEvent::StateChanged {
                    state: UpdateState::VerifyingIntegrity,
                } = event
                {
                    handle.cancel();
                    break;
                }
            }
        });

        let state = updater.start().await?;
        canceller.await.unwrap();

        a.assert_async().await;
        b.assert_async().await;
        assert_eq!(state, UpdateState::UpdateAvailable);
        assert_eq!(updater.pending().map(|p| p.len()), Some(2));
        assert!(!install.path().join("Data/a.MPQ").exists());
        assert_eq!(
            states(&mut rx),
            vec![
                UpdateState::GetManifest,
                UpdateState::VerifyingIntegrity,
                UpdateState::UpdateAvailable,
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_from_earlier_cycle_does_not_carry_over() -> Result<()> {
        let mut server = Server::new_async().await;
        let manifest = format!(
            r#"{{"Version":"1","Files":[{{"Path":"Data/a.MPQ","Size":3,"URL":"{}/files/a.MPQ"}}]}}"#,
            server.url()
        );
        let _manifest = serve_manifest(&mut server, manifest).await;
        let file = server
            .mock("GET", "/files/a.MPQ")
            .with_status(200)
            .with_body(b"aaa")
            .expect(1)
            .create_async()
            .await;

        let install = TempDir::new()?;
        let updater = updater_for(&server, Some(install.path()))?;

        updater.cancel();
        assert_eq!(updater.start().await?, UpdateState::Done);
        file.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_unwritable_install_requires_elevation() -> Result<()> {
        let mut server = Server::new_async().await;
        let manifest = format!(
            r#"{{"Version":"1","Files":[{{"Path":"Data/a.MPQ","Size":1,"URL":"{}/files/a.MPQ"}}]}}"#,
            server.url()
        );
        let _manifest = serve_manifest(&mut server, manifest).await;
        let never = server.mock("GET", "/files/a.MPQ").expect(0).create_async().await;

        let install = TempDir::new()?;
        let updater = updater_for(&server, Some(install.path()))?.with_write_check(|_| false);
        let mut rx = updater.subscribe();

        assert_eq!(updater.start().await?, UpdateState::RequiresElevation);
        never.assert_async().await;
        assert!(!install.path().join("Data").exists());
        assert_eq!(
            states(&mut rx),
            vec![
                UpdateState::GetManifest,
                UpdateState::VerifyingIntegrity,
                UpdateState::RequiresElevation,
            ]
        );
        Ok(())
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_read_only_install_requires_elevation() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        if nix::unistd::Uid::effective().is_root() {
            return Ok(());
        }

        let mut server = Server::new_async().await;
        let manifest = format!(
            r#"{{"Version":"1","Files":[{{"Path":"Data/a.MPQ","Size":1,"URL":"{}/files/a.MPQ"}}]}}"#,
            server.url()
        );
        let _manifest = serve_manifest(&mut server, manifest).await;

        let install = TempDir::new()?;
        std::fs::set_permissions(install.path(), std::fs::Permissions::from_mode(0o555))?;

        let updater = updater_for(&server, Some(install.path()))?;
        let state = updater.start().await;

        std::fs::set_permissions(install.path(), std::fs::Permissions::from_mode(0o755))?;
        assert_eq!(state?, UpdateState::RequiresElevation);
        Ok(())
    }
}
