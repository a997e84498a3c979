// noFriction Meetings - Capture Mode Controller
// Ambient / Meeting / Paused state machine for always-on capture
//
// Features:
// - Permitted transitions only (no automatic Meeting -> Ambient demotion)
// - Remote call first, local commit second: a failed call leaves the mode untouched
// - Always-on master switch and advisory meeting auto-escalation
// - Background reconcile loop adopting the backend's authoritative mode

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::backend::CaptureBackend;
use crate::error::{EngineError, EngineResult};
use crate::meeting_trigger::MeetingDetection;

/// Capture mode determines capture behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureMode {
    /// Background capture - lower frequency, no audio
    Ambient,
    /// Active meeting - higher frequency, with audio transcription
    Meeting,
    /// Capture paused
    Paused,
}

impl CaptureMode {
    /// Whether `self -> target` is a permitted transition. Staying put is always allowed.
    pub fn can_transition_to(self, target: CaptureMode) -> bool {
        use CaptureMode::*;
        match (self, target) {
            (a, b) if a == b => true,
            (Paused, Ambient) | (Paused, Meeting) | (Ambient, Meeting) => true,
            (Ambient, Paused) | (Meeting, Paused) => true,
            (Meeting, Ambient) => false,
            _ => false,
        }
    }
}

/// Always-on capture settings, owned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlwaysOnSettings {
    pub enabled: bool,
    /// Minutes of user inactivity before ambient capture pauses
    pub idle_timeout_mins: u32,
    pub ambient_interval_secs: u32,
    pub meeting_interval_secs: u32,
    /// Hours ambient captures are kept
    pub retention_hours: u32,
    pub calendar_detection: bool,
    pub app_detection: bool,
}

impl Default for AlwaysOnSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            idle_timeout_mins: 5,
            ambient_interval_secs: 30,
            meeting_interval_secs: 2,
            retention_hours: 24,
            calendar_detection: true,
            app_detection: true,
        }
    }
}

/// What a mode means for the recorder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureProfile {
    pub mode: CaptureMode,
    /// None when nothing is captured
    pub frame_interval: Option<Duration>,
    pub audio: bool,
    pub screen: bool,
}

impl CaptureProfile {
    pub fn for_mode(mode: CaptureMode, settings: &AlwaysOnSettings) -> Self {
        match mode {
            CaptureMode::Ambient => Self {
                mode,
                frame_interval: Some(Duration::from_secs(settings.ambient_interval_secs as u64)),
                audio: false,
                screen: true,
            },
            CaptureMode::Meeting => Self {
                mode,
                frame_interval: Some(Duration::from_secs(settings.meeting_interval_secs as u64)),
                audio: true,
                screen: true,
            },
            CaptureMode::Paused => Self {
                mode,
                frame_interval: None,
                audio: false,
                screen: false,
            },
        }
    }
}

/// The process-wide capture session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureSession {
    pub mode: CaptureMode,
    /// When the current mode was entered; None while paused
    pub started_at: Option<DateTime<Utc>>,
    /// Always-on master switch
    pub enabled: bool,
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self {
            mode: CaptureMode::Paused,
            started_at: None,
            enabled: false,
        }
    }
}

/// Outcome of a meeting auto-detection proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoEscalation {
    Escalated,
    MasterSwitchOff,
    AlreadyInMeeting,
}

static GLOBAL_CONTROLLER: OnceCell<Arc<CaptureModeController>> = OnceCell::new();

/// Capture Mode Controller - the only writer of the CaptureSession
pub struct CaptureModeController {
    backend: Arc<dyn CaptureBackend>,
    session: RwLock<CaptureSession>,
    settings: RwLock<AlwaysOnSettings>,
    /// One transition in flight at a time
    transition_lock: tokio::sync::Mutex<()>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl CaptureModeController {
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            session: RwLock::new(CaptureSession::default()),
            settings: RwLock::new(AlwaysOnSettings::default()),
            transition_lock: tokio::sync::Mutex::new(()),
            poller: Mutex::new(None),
        }
    }

    /// Install the process-wide controller. Returns the rejected controller if one exists.
    pub fn install_global(
        controller: Arc<CaptureModeController>,
    ) -> Result<(), Arc<CaptureModeController>> {
        GLOBAL_CONTROLLER.set(controller)
    }

    pub fn global() -> Option<Arc<CaptureModeController>> {
        GLOBAL_CONTROLLER.get().cloned()
    }

    /// The process-wide controller, created over `backend` on first use.
    /// Later callers share it; their backend is not used.
    pub fn shared(backend: Arc<dyn CaptureBackend>) -> Arc<CaptureModeController> {
        GLOBAL_CONTROLLER
            .get_or_init(|| {
                log::info!("📹 Capture mode controller installed");
                Arc::new(CaptureModeController::new(backend))
            })
            .clone()
    }

    /// Get current capture mode
    pub fn mode(&self) -> CaptureMode {
        self.session.read().mode
    }

    pub fn session(&self) -> CaptureSession {
        self.session.read().clone()
    }

    pub fn settings(&self) -> AlwaysOnSettings {
        self.settings.read().clone()
    }

    pub fn profile(&self) -> CaptureProfile {
        CaptureProfile::for_mode(self.mode(), &self.settings.read())
    }

    /// Move to `target` through the backend. On failure the current mode stays in effect.
    pub async fn request_transition(&self, target: CaptureMode) -> EngineResult<CaptureMode> {
        let _guard = self.transition_lock.lock().await;
        self.transition_locked(target).await
    }

    async fn transition_locked(&self, target: CaptureMode) -> EngineResult<CaptureMode> {
        let current = self.mode();
        if current == target {
            return Ok(current);
        }
        if !current.can_transition_to(target) {
            return Err(EngineError::TransitionRejected {
                requested: target,
                current,
                reason: "not a permitted transition".to_string(),
            });
        }

        let result = match target {
            CaptureMode::Ambient => self.backend.start_ambient_capture().await,
            CaptureMode::Meeting => self.backend.start_meeting_capture().await,
            CaptureMode::Paused => self.backend.pause_capture().await,
        };

        if let Err(e) = result {
            log::warn!(
                "⚠️ Capture transition {:?} -> {:?} failed: {}",
                current,
                target,
                e
            );
            return Err(EngineError::TransitionRejected {
                requested: target,
                current,
                reason: e.to_string(),
            });
        }

        self.commit_mode(target);
        Ok(target)
    }

    fn commit_mode(&self, mode: CaptureMode) {
        let mut session = self.session.write();
        let old_mode = session.mode;
        if old_mode == mode {
            return;
        }
        session.mode = mode;
        session.started_at = match mode {
            CaptureMode::Paused => None,
            _ => Some(Utc::now()),
        };
        log::info!("📹 Capture mode changed: {:?} -> {:?}", old_mode, mode);
    }

    /// Always-on master switch. Enabling starts ambient capture from Paused; disabling pauses.
    pub async fn set_always_on(&self, enabled: bool) -> EngineResult<CaptureMode> {
        let _guard = self.transition_lock.lock().await;

        self.backend.set_always_on_enabled(enabled).await?;

        let transition = match (enabled, self.mode()) {
            (true, CaptureMode::Paused) => self.transition_locked(CaptureMode::Ambient).await,
            (false, mode) if mode != CaptureMode::Paused => {
                self.transition_locked(CaptureMode::Paused).await
            }
            (_, mode) => Ok(mode),
        };

        match transition {
            Ok(mode) => {
                self.settings.write().enabled = enabled;
                self.session.write().enabled = enabled;
                log::info!("📹 Always-on capture {}", if enabled { "enabled" } else { "disabled" });
                Ok(mode)
            }
            Err(e) => {
                if let Err(restore) = self.backend.set_always_on_enabled(!enabled).await {
                    log::error!("❌ Could not restore always-on flag: {}", restore);
                }
                Err(e)
            }
        }
    }

    /// Escalate to Meeting for an auto-detected meeting, if always-on is enabled
    pub async fn propose_meeting(
        &self,
        detection: &MeetingDetection,
    ) -> EngineResult<AutoEscalation> {
        if !self.settings.read().enabled {
            log::debug!("🎯 Ignoring detection {} (always-on disabled)", detection.id);
            return Ok(AutoEscalation::MasterSwitchOff);
        }
        if self.mode() == CaptureMode::Meeting {
            return Ok(AutoEscalation::AlreadyInMeeting);
        }

        log::info!(
            "🎯 Escalating to meeting capture ({:?}: {})",
            detection.source,
            detection.id
        );
        self.request_transition(CaptureMode::Meeting).await?;
        Ok(AutoEscalation::Escalated)
    }

    /// Adopt the backend's mode and settings. Backend state is authoritative.
    pub async fn reconcile(&self) -> EngineResult<CaptureMode> {
        let _guard = self.transition_lock.lock().await;

        let remote = self.backend.get_capture_mode().await?;
        let settings = self.backend.get_always_on_settings().await?;

        if remote != self.mode() {
            log::info!("📹 Adopting backend capture mode {:?}", remote);
        }
        self.commit_mode(remote);
        self.session.write().enabled = settings.enabled;
        *self.settings.write() = settings;

        Ok(remote)
    }

    /// Persist capture tunables. The master switch only changes through `set_always_on`.
    pub async fn update_settings(&self, settings: AlwaysOnSettings) -> EngineResult<()> {
        let settings = AlwaysOnSettings {
            enabled: self.settings.read().enabled,
            ..settings
        };
        self.backend.set_always_on_settings(&settings).await?;
        *self.settings.write() = settings;
        log::info!("📹 Always-on settings updated");
        Ok(())
    }

    pub fn is_polling(&self) -> bool {
        self.poller
            .lock()
            .as_ref()
            .is_some_and(|poller| !poller.is_finished())
    }

    /// Start the background reconcile loop
    pub fn start_polling(self: &Arc<Self>, interval: Duration) {
        let mut poller = self.poller.lock();
        if poller.as_ref().is_some_and(|p| !p.is_finished()) {
            log::info!("Capture mode polling already running");
            return;
        }
        log::info!("📹 Capture mode polling every {}s", interval.as_secs());

        let controller = Arc::downgrade(self);
        *poller = Some(tokio::spawn(async move {
            loop {
                let Some(controller) = controller.upgrade() else {
                    return;
                };
                if let Err(e) = controller.reconcile().await {
                    log::warn!("⚠️ Capture mode poll failed: {}", e);
                }
                drop(controller);
                tokio::time::sleep(interval).await;
            }
        }));
    }

    pub fn stop_polling(&self) {
        if let Some(poller) = self.poller.lock().take() {
            poller.abort();
            log::info!("📹 Capture mode polling stopped");
        }
    }
}
