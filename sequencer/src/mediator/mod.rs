//! Equipment mediators
//!
//! Items never talk to drivers. Every device category is reached through a
//! mediator trait that offers a synchronous info snapshot, a publish/subscribe
//! channel of snapshot changes, and async actions that honour a
//! [`CancellationFlag`]. The host decides what sits behind the traits; the
//! [`crate::simulator`] module provides in-process devices.

pub mod info;

pub use info::*;

use crate::astro::Coordinates;
use crate::cancellation::CancellationFlag;
use crate::error::EquipmentResult;
use async_trait::async_trait;
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;
use tokio::sync::broadcast;

/// Snapshot access and change notifications for one device category
pub trait DeviceSession<I>: Send + Sync {
    /// Current state of the device
    fn get_info(&self) -> I;

    /// Receive every snapshot published after this call
    fn subscribe(&self) -> broadcast::Receiver<I>;
}

/// Holds the latest snapshot of a device and fans out updates
pub struct InfoHub<I> {
    snapshot: StdRwLock<I>,
    tx: broadcast::Sender<I>,
}

impl<I: Clone + Send + Sync + 'static> InfoHub<I> {
    pub fn new(initial: I) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            snapshot: StdRwLock::new(initial),
            tx,
        }
    }

    pub fn get(&self) -> I {
        match self.snapshot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<I> {
        self.tx.subscribe()
    }

    /// Mutate the snapshot and publish the result
    pub fn update<F>(&self, f: F) -> I
    where
        F: FnOnce(&mut I),
    {
        let updated = {
            let mut guard = match self.snapshot.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            f(&mut guard);
            guard.clone()
        };
        // no subscribers is fine
        let _ = self.tx.send(updated.clone());
        updated
    }
}

// =========================================================================
// CAMERA
// =========================================================================

#[async_trait]
pub trait CameraMediator: DeviceSession<CameraInfo> {
    /// Whether `owner` may capture right now
    fn is_free_to_capture(&self, owner: &str) -> bool;

    /// Claim exclusive capture access for `owner`
    fn register_capture_block(&self, owner: &str) -> EquipmentResult<()>;

    /// Give capture access back; releasing a block not held by `owner` is a no-op
    fn release_capture_block(&self, owner: &str);

    async fn capture(
        &self,
        request: &CaptureRequest,
        cancel: &CancellationFlag,
    ) -> EquipmentResult<CapturedFrame>;

    /// Cool the sensor to `target_celsius`, ramping over `duration`
    async fn cool(
        &self,
        target_celsius: f64,
        duration: Duration,
        cancel: &CancellationFlag,
    ) -> EquipmentResult<()>;

    /// Warm the sensor to ambient over `duration` and switch the cooler off
    async fn warm(&self, duration: Duration, cancel: &CancellationFlag) -> EquipmentResult<()>;
}

// =========================================================================
// FOCUSER
// =========================================================================

#[async_trait]
pub trait FocuserMediator: DeviceSession<FocuserInfo> {
    /// Move to an absolute step position; returns the reached position
    async fn move_to(&self, position: i32, cancel: &CancellationFlag) -> EquipmentResult<i32>;

    /// Move by a signed number of steps; returns the reached position
    async fn move_relative(&self, offset: i32, cancel: &CancellationFlag) -> EquipmentResult<i32>;

    async fn auto_focus(
        &self,
        filter: Option<&str>,
        cancel: &CancellationFlag,
    ) -> EquipmentResult<AutofocusReport>;
}

// =========================================================================
// TELESCOPE
// =========================================================================

#[async_trait]
pub trait TelescopeMediator: DeviceSession<TelescopeInfo> {
    async fn slew_to_coordinates(
        &self,
        coordinates: Coordinates,
        cancel: &CancellationFlag,
    ) -> EquipmentResult<()>;

    async fn park(&self, cancel: &CancellationFlag) -> EquipmentResult<()>;

    async fn unpark(&self, cancel: &CancellationFlag) -> EquipmentResult<()>;

    async fn set_tracking(&self, mode: TrackingMode) -> EquipmentResult<()>;
}

// =========================================================================
// FILTER WHEEL
// =========================================================================

#[async_trait]
pub trait FilterWheelMediator: DeviceSession<FilterWheelInfo> {
    /// Select a filter by name
    async fn change_filter(&self, filter: &str, cancel: &CancellationFlag) -> EquipmentResult<()>;
}

// =========================================================================
// GUIDER
// =========================================================================

#[async_trait]
pub trait GuiderMediator: DeviceSession<GuiderInfo> {
    async fn start_guiding(
        &self,
        force_calibration: bool,
        cancel: &CancellationFlag,
    ) -> EquipmentResult<()>;

    async fn stop_guiding(&self, cancel: &CancellationFlag) -> EquipmentResult<()>;

    /// Dither and wait for guiding to settle
    async fn dither(&self, cancel: &CancellationFlag) -> EquipmentResult<()>;
}

// =========================================================================
// DOME
// =========================================================================

#[async_trait]
pub trait DomeMediator: DeviceSession<DomeInfo> {
    async fn open_shutter(&self, cancel: &CancellationFlag) -> EquipmentResult<()>;

    async fn close_shutter(&self, cancel: &CancellationFlag) -> EquipmentResult<()>;

    async fn park(&self, cancel: &CancellationFlag) -> EquipmentResult<()>;

    async fn slew_to_azimuth(&self, azimuth: f64, cancel: &CancellationFlag)
        -> EquipmentResult<()>;
}

// =========================================================================
// SWITCH
// =========================================================================

#[async_trait]
pub trait SwitchMediator: DeviceSession<SwitchInfo> {
    async fn set_value(&self, index: u16, value: f64, cancel: &CancellationFlag)
        -> EquipmentResult<()>;
}

/// Handles to every device category available to a run
#[derive(Clone)]
pub struct Equipment {
    pub camera: Arc<dyn CameraMediator>,
    pub focuser: Arc<dyn FocuserMediator>,
    pub telescope: Arc<dyn TelescopeMediator>,
    pub filter_wheel: Arc<dyn FilterWheelMediator>,
    pub guider: Arc<dyn GuiderMediator>,
    pub dome: Arc<dyn DomeMediator>,
    pub switch: Arc<dyn SwitchMediator>,
}

impl std::fmt::Debug for Equipment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Equipment")
            .field("camera", &self.camera.get_info().name)
            .field("focuser", &self.focuser.get_info().name)
            .field("telescope", &self.telescope.get_info().name)
            .field("filter_wheel", &self.filter_wheel.get_info().name)
            .field("guider", &self.guider.get_info().name)
            .field("dome", &self.dome.get_info().name)
            .field("switch", &self.switch.get_info().name)
            .finish()
    }
}
