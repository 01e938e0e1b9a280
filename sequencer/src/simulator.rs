//! Simulated equipment
//!
//! In-process implementations of every mediator trait. Device actions take
//! simulated time scaled by [`SimulatorOptions::time_scale`]; a scale of `0.0`
//! makes every action complete immediately, which is what the tests use.

use crate::astro::{self, Coordinates, ObserverLocation};
use crate::cancellation::CancellationFlag;
use crate::error::{EquipmentError, EquipmentResult};
use crate::mediator::*;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// Configuration of the simulated equipment set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorOptions {
    /// Multiplier applied to every simulated delay
    pub time_scale: f64,
    pub filters: Vec<String>,
    pub focuser_position: i32,
    pub focuser_max_step: i32,
    pub focuser_temperature: Option<f64>,
    pub ambient_temperature: f64,
    pub switches: Vec<SwitchPort>,
    pub observer: Option<ObserverLocation>,
}

impl Default for SimulatorOptions {
    fn default() -> Self {
        Self {
            time_scale: 0.0,
            filters: ["L", "R", "G", "B", "Ha", "OIII", "SII"]
                .iter()
                .map(|f| f.to_string())
                .collect(),
            focuser_position: 25_000,
            focuser_max_step: 50_000,
            focuser_temperature: Some(12.0),
            ambient_temperature: 15.0,
            switches: vec![
                SwitchPort {
                    index: 0,
                    name: "Dew Heater".to_string(),
                    value: 0.0,
                    minimum: 0.0,
                    maximum: 100.0,
                    writable: true,
                },
                SwitchPort {
                    index: 1,
                    name: "Input Voltage".to_string(),
                    value: 12.4,
                    minimum: 0.0,
                    maximum: 15.0,
                    writable: false,
                },
            ],
            observer: None,
        }
    }
}

fn scaled(time_scale: f64, duration: Duration) -> Duration {
    crate::duration_from_secs(duration.as_secs_f64() * time_scale)
}

async fn simulate(time_scale: f64, duration: Duration, cancel: &CancellationFlag) -> EquipmentResult<()> {
    let wait = scaled(time_scale, duration);
    if wait.is_zero() {
        if cancel.is_cancelled() {
            return Err(EquipmentError::Cancelled);
        }
        tokio::task::yield_now().await;
        return Ok(());
    }
    cancel.sleep(wait).await
}

macro_rules! impl_session {
    ($device:ty, $info:ty) => {
        impl DeviceSession<$info> for $device {
            fn get_info(&self) -> $info {
                self.hub.get()
            }

            fn subscribe(&self) -> broadcast::Receiver<$info> {
                self.hub.subscribe()
            }
        }

        impl $device {
            /// Snapshot hub, for adjusting simulated state
            pub fn hub(&self) -> &InfoHub<$info> {
                &self.hub
            }

            pub fn set_connected(&self, connected: bool) {
                self.hub.update(|info| info.connected = connected);
            }
        }
    };
}

// =========================================================================
// CAMERA
// =========================================================================

pub struct SimulatedCamera {
    hub: InfoHub<CameraInfo>,
    capture_block: Mutex<Option<String>>,
    filter_wheel: Option<Arc<SimulatedFilterWheel>>,
    ambient_temperature: f64,
    time_scale: f64,
    pending_failures: AtomicU32,
    captures: AtomicU32,
}

impl_session!(SimulatedCamera, CameraInfo);

impl SimulatedCamera {
    pub fn new(options: &SimulatorOptions, filter_wheel: Option<Arc<SimulatedFilterWheel>>) -> Self {
        Self {
            hub: InfoHub::new(CameraInfo {
                connected: true,
                name: "Camera Simulator".to_string(),
                temperature: options.ambient_temperature,
                target_temperature: None,
                cooler_on: false,
                cooler_power: 0.0,
                can_set_temperature: true,
                is_exposing: false,
                gain: 100,
                offset: 10,
                max_bin: 4,
            }),
            capture_block: Mutex::new(None),
            filter_wheel,
            ambient_temperature: options.ambient_temperature,
            time_scale: options.time_scale,
            pending_failures: AtomicU32::new(0),
            captures: AtomicU32::new(0),
        }
    }

    /// Make the next `count` captures fail
    pub fn inject_failures(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Number of successful captures so far
    pub fn capture_count(&self) -> u32 {
        self.captures.load(Ordering::SeqCst)
    }

    fn block(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        match self.capture_block.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn ensure_connected(&self) -> EquipmentResult<CameraInfo> {
        let info = self.hub.get();
        if !info.connected {
            return Err(EquipmentError::NotConnected("Camera".to_string()));
        }
        Ok(info)
    }
}

#[async_trait]
impl CameraMediator for SimulatedCamera {
    fn is_free_to_capture(&self, owner: &str) -> bool {
        match self.block().as_deref() {
            None => true,
            Some(holder) => holder == owner,
        }
    }

    fn register_capture_block(&self, owner: &str) -> EquipmentResult<()> {
        let mut block = self.block();
        match block.as_deref() {
            Some(holder) if holder != owner => {
                Err(EquipmentError::CaptureBlocked(holder.to_string()))
            }
            _ => {
                *block = Some(owner.to_string());
                Ok(())
            }
        }
    }

    fn release_capture_block(&self, owner: &str) {
        let mut block = self.block();
        if block.as_deref() == Some(owner) {
            *block = None;
        }
    }

    async fn capture(
        &self,
        request: &CaptureRequest,
        cancel: &CancellationFlag,
    ) -> EquipmentResult<CapturedFrame> {
        self.ensure_connected()?;
        if request.binning == 0 || request.binning > self.hub.get().max_bin {
            return Err(EquipmentError::InvalidRequest(format!(
                "binning {} not supported",
                request.binning
            )));
        }

        let started_at = chrono::Utc::now();
        self.hub.update(|info| info.is_exposing = true);
        let result = simulate(
            self.time_scale,
            crate::duration_from_secs(request.exposure_time),
            cancel,
        )
        .await;
        self.hub.update(|info| info.is_exposing = false);
        result?;

        let failed = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(EquipmentError::Device("simulated exposure failure".to_string()));
        }

        self.captures.fetch_add(1, Ordering::SeqCst);
        let filter = self
            .filter_wheel
            .as_ref()
            .and_then(|fw| fw.get_info().selected_filter);
        Ok(CapturedFrame {
            exposure_time: request.exposure_time,
            image_type: request.image_type,
            filter,
            started_at,
            hfr: Some(rand::thread_rng().gen_range(1.8..2.6)),
        })
    }

    async fn cool(
        &self,
        target_celsius: f64,
        duration: Duration,
        cancel: &CancellationFlag,
    ) -> EquipmentResult<()> {
        let info = self.ensure_connected()?;
        if !info.can_set_temperature {
            return Err(EquipmentError::NotSupported {
                device: "Camera".to_string(),
                operation: "set temperature".to_string(),
            });
        }
        self.hub.update(|info| {
            info.cooler_on = true;
            info.target_temperature = Some(target_celsius);
        });
        simulate(self.time_scale, duration, cancel).await?;
        self.hub.update(|info| {
            info.temperature = target_celsius;
            info.cooler_power = ((self.ambient_temperature - target_celsius) * 2.5).clamp(0.0, 100.0);
        });
        Ok(())
    }

    async fn warm(&self, duration: Duration, cancel: &CancellationFlag) -> EquipmentResult<()> {
        self.ensure_connected()?;
        simulate(self.time_scale, duration, cancel).await?;
        self.hub.update(|info| {
            info.temperature = self.ambient_temperature;
            info.target_temperature = None;
            info.cooler_on = false;
            info.cooler_power = 0.0;
        });
        Ok(())
    }
}

// =========================================================================
// FOCUSER
// =========================================================================

pub struct SimulatedFocuser {
    hub: InfoHub<FocuserInfo>,
    filter_wheel: Option<Arc<SimulatedFilterWheel>>,
    time_scale: f64,
    autofocus_runs: AtomicU32,
}

impl_session!(SimulatedFocuser, FocuserInfo);

impl SimulatedFocuser {
    pub fn new(options: &SimulatorOptions, filter_wheel: Option<Arc<SimulatedFilterWheel>>) -> Self {
        Self {
            hub: InfoHub::new(FocuserInfo {
                connected: true,
                name: "Focuser Simulator".to_string(),
                position: options.focuser_position,
                max_step: options.focuser_max_step,
                temperature: options.focuser_temperature,
                is_moving: false,
            }),
            filter_wheel,
            time_scale: options.time_scale,
            autofocus_runs: AtomicU32::new(0),
        }
    }

    pub fn set_temperature(&self, temperature: Option<f64>) {
        self.hub.update(|info| info.temperature = temperature);
    }

    pub fn autofocus_runs(&self) -> u32 {
        self.autofocus_runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FocuserMediator for SimulatedFocuser {
    async fn move_to(&self, position: i32, cancel: &CancellationFlag) -> EquipmentResult<i32> {
        let info = self.hub.get();
        if !info.connected {
            return Err(EquipmentError::NotConnected("Focuser".to_string()));
        }
        if position < 0 || position > info.max_step {
            return Err(EquipmentError::InvalidRequest(format!(
                "position {} outside 0..={}",
                position, info.max_step
            )));
        }

        let steps = (position - info.position).unsigned_abs() as f64;
        self.hub.update(|info| info.is_moving = true);
        let travel = crate::duration_from_secs(steps / 1000.0);
        let result = simulate(self.time_scale, travel, cancel).await;
        self.hub.update(|info| {
            info.is_moving = false;
            if result.is_ok() {
                info.position = position;
            }
        });
        result.map(|_| position)
    }

    async fn move_relative(&self, offset: i32, cancel: &CancellationFlag) -> EquipmentResult<i32> {
        let current = self.hub.get().position;
        self.move_to(current.saturating_add(offset), cancel).await
    }

    async fn auto_focus(
        &self,
        filter: Option<&str>,
        cancel: &CancellationFlag,
    ) -> EquipmentResult<AutofocusReport> {
        let info = self.hub.get();
        if !info.connected {
            return Err(EquipmentError::NotConnected("Focuser".to_string()));
        }

        simulate(self.time_scale, Duration::from_secs(120), cancel).await?;

        let shift = rand::thread_rng().gen_range(-40..=40);
        let position = (info.position + shift).clamp(0, info.max_step);
        self.hub.update(|info| info.position = position);
        self.autofocus_runs.fetch_add(1, Ordering::SeqCst);

        let filter = filter.map(str::to_string).or_else(|| {
            self.filter_wheel
                .as_ref()
                .and_then(|fw| fw.get_info().selected_filter)
        });
        Ok(AutofocusReport {
            position,
            hfr: rand::thread_rng().gen_range(1.7..2.2),
            temperature: info.temperature,
            filter,
            completed_at: chrono::Utc::now(),
        })
    }
}

// =========================================================================
// TELESCOPE
// =========================================================================

pub struct SimulatedTelescope {
    hub: InfoHub<TelescopeInfo>,
    observer: Option<ObserverLocation>,
    time_scale: f64,
}

impl_session!(SimulatedTelescope, TelescopeInfo);

impl SimulatedTelescope {
    pub fn new(options: &SimulatorOptions) -> Self {
        Self {
            hub: InfoHub::new(TelescopeInfo {
                connected: true,
                name: "Telescope Simulator".to_string(),
                coordinates: None,
                altitude: 90.0,
                azimuth: 0.0,
                at_park: false,
                slewing: false,
                tracking_mode: TrackingMode::Stopped,
                can_park: true,
                can_set_tracking: true,
            }),
            observer: options.observer,
            time_scale: options.time_scale,
        }
    }

    fn ensure_ready(&self) -> EquipmentResult<TelescopeInfo> {
        let info = self.hub.get();
        if !info.connected {
            return Err(EquipmentError::NotConnected("Telescope".to_string()));
        }
        Ok(info)
    }
}

#[async_trait]
impl TelescopeMediator for SimulatedTelescope {
    async fn slew_to_coordinates(
        &self,
        coordinates: Coordinates,
        cancel: &CancellationFlag,
    ) -> EquipmentResult<()> {
        let info = self.ensure_ready()?;
        if info.at_park {
            return Err(EquipmentError::Device("telescope is parked".to_string()));
        }
        if !coordinates.is_valid() {
            return Err(EquipmentError::InvalidRequest(format!(
                "invalid coordinates RA {:.4}h Dec {:.4}",
                coordinates.ra_hours, coordinates.dec_degrees
            )));
        }

        self.hub.update(|info| info.slewing = true);
        let result = simulate(self.time_scale, Duration::from_secs(15), cancel).await;
        let horizontal = self
            .observer
            .map(|site| astro::to_horizontal(&coordinates, &site, &chrono::Utc::now()));
        self.hub.update(|info| {
            info.slewing = false;
            if result.is_ok() {
                info.coordinates = Some(coordinates);
                if let Some(h) = horizontal {
                    info.altitude = h.altitude;
                    info.azimuth = h.azimuth;
                }
                if info.tracking_mode == TrackingMode::Stopped {
                    info.tracking_mode = TrackingMode::Sidereal;
                }
            }
        });
        result
    }

    async fn park(&self, cancel: &CancellationFlag) -> EquipmentResult<()> {
        let info = self.ensure_ready()?;
        if !info.can_park {
            return Err(EquipmentError::NotSupported {
                device: "Telescope".to_string(),
                operation: "park".to_string(),
            });
        }
        simulate(self.time_scale, Duration::from_secs(20), cancel).await?;
        self.hub.update(|info| {
            info.at_park = true;
            info.tracking_mode = TrackingMode::Stopped;
            info.altitude = 90.0;
            info.azimuth = 0.0;
        });
        Ok(())
    }

    async fn unpark(&self, cancel: &CancellationFlag) -> EquipmentResult<()> {
        self.ensure_ready()?;
        simulate(self.time_scale, Duration::from_secs(2), cancel).await?;
        self.hub.update(|info| info.at_park = false);
        Ok(())
    }

    async fn set_tracking(&self, mode: TrackingMode) -> EquipmentResult<()> {
        let info = self.ensure_ready()?;
        if info.at_park && mode != TrackingMode::Stopped {
            return Err(EquipmentError::Device("telescope is parked".to_string()));
        }
        self.hub.update(|info| info.tracking_mode = mode);
        Ok(())
    }
}

// =========================================================================
// FILTER WHEEL
// =========================================================================

pub struct SimulatedFilterWheel {
    hub: InfoHub<FilterWheelInfo>,
    time_scale: f64,
}

impl_session!(SimulatedFilterWheel, FilterWheelInfo);

impl SimulatedFilterWheel {
    pub fn new(options: &SimulatorOptions) -> Self {
        Self {
            hub: InfoHub::new(FilterWheelInfo {
                connected: true,
                name: "Filter Wheel Simulator".to_string(),
                filters: options.filters.clone(),
                selected_filter: options.filters.first().cloned(),
                is_moving: false,
            }),
            time_scale: options.time_scale,
        }
    }
}

#[async_trait]
impl FilterWheelMediator for SimulatedFilterWheel {
    async fn change_filter(&self, filter: &str, cancel: &CancellationFlag) -> EquipmentResult<()> {
        let info = self.hub.get();
        if !info.connected {
            return Err(EquipmentError::NotConnected("Filter wheel".to_string()));
        }
        if !info.filters.iter().any(|f| f == filter) {
            return Err(EquipmentError::InvalidRequest(format!("unknown filter {}", filter)));
        }
        if info.selected_filter.as_deref() == Some(filter) {
            return Ok(());
        }

        self.hub.update(|info| info.is_moving = true);
        let result = simulate(self.time_scale, Duration::from_secs(3), cancel).await;
        self.hub.update(|info| {
            info.is_moving = false;
            if result.is_ok() {
                info.selected_filter = Some(filter.to_string());
            }
        });
        result
    }
}

// =========================================================================
// GUIDER
// =========================================================================

pub struct SimulatedGuider {
    hub: InfoHub<GuiderInfo>,
    time_scale: f64,
    dithers: AtomicU32,
}

impl_session!(SimulatedGuider, GuiderInfo);

impl SimulatedGuider {
    pub fn new(options: &SimulatorOptions) -> Self {
        Self {
            hub: InfoHub::new(GuiderInfo {
                connected: true,
                name: "Guider Simulator".to_string(),
                ..Default::default()
            }),
            time_scale: options.time_scale,
            dithers: AtomicU32::new(0),
        }
    }

    pub fn dither_count(&self) -> u32 {
        self.dithers.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GuiderMediator for SimulatedGuider {
    async fn start_guiding(
        &self,
        force_calibration: bool,
        cancel: &CancellationFlag,
    ) -> EquipmentResult<()> {
        if !self.hub.get().connected {
            return Err(EquipmentError::NotConnected("Guider".to_string()));
        }
        let settle = if force_calibration { 90 } else { 10 };
        simulate(self.time_scale, Duration::from_secs(settle), cancel).await?;
        let rms = rand::thread_rng().gen_range(0.4..0.9);
        self.hub.update(|info| {
            info.is_guiding = true;
            info.rms_total = rms;
        });
        Ok(())
    }

    async fn stop_guiding(&self, _cancel: &CancellationFlag) -> EquipmentResult<()> {
        if !self.hub.get().connected {
            return Err(EquipmentError::NotConnected("Guider".to_string()));
        }
        self.hub.update(|info| {
            info.is_guiding = false;
            info.is_dithering = false;
        });
        Ok(())
    }

    async fn dither(&self, cancel: &CancellationFlag) -> EquipmentResult<()> {
        let info = self.hub.get();
        if !info.connected {
            return Err(EquipmentError::NotConnected("Guider".to_string()));
        }
        if !info.is_guiding {
            return Err(EquipmentError::Device("guider is not guiding".to_string()));
        }
        self.hub.update(|info| info.is_dithering = true);
        let result = simulate(self.time_scale, Duration::from_secs(8), cancel).await;
        self.hub.update(|info| info.is_dithering = false);
        result?;
        self.dithers.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =========================================================================
// DOME
// =========================================================================

pub struct SimulatedDome {
    hub: InfoHub<DomeInfo>,
    time_scale: f64,
}

impl_session!(SimulatedDome, DomeInfo);

impl SimulatedDome {
    pub fn new(options: &SimulatorOptions) -> Self {
        Self {
            hub: InfoHub::new(DomeInfo {
                connected: true,
                name: "Dome Simulator".to_string(),
                shutter: ShutterState::Closed,
                azimuth: 0.0,
                at_park: true,
                slewing: false,
                can_set_shutter: true,
                can_park: true,
                can_set_azimuth: true,
            }),
            time_scale: options.time_scale,
        }
    }

    fn require(&self, capable: bool, operation: &str) -> EquipmentResult<()> {
        if !self.hub.get().connected {
            return Err(EquipmentError::NotConnected("Dome".to_string()));
        }
        if !capable {
            return Err(EquipmentError::NotSupported {
                device: "Dome".to_string(),
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    async fn move_shutter(
        &self,
        moving: ShutterState,
        done: ShutterState,
        cancel: &CancellationFlag,
    ) -> EquipmentResult<()> {
        self.require(self.hub.get().can_set_shutter, "move the shutter")?;
        if self.hub.get().shutter == done {
            return Ok(());
        }
        self.hub.update(|info| info.shutter = moving);
        let result = simulate(self.time_scale, Duration::from_secs(30), cancel).await;
        self.hub.update(|info| {
            info.shutter = if result.is_ok() { done } else { ShutterState::Error };
        });
        result
    }
}

#[async_trait]
impl DomeMediator for SimulatedDome {
    async fn open_shutter(&self, cancel: &CancellationFlag) -> EquipmentResult<()> {
        self.move_shutter(ShutterState::Opening, ShutterState::Open, cancel)
            .await
    }

    async fn close_shutter(&self, cancel: &CancellationFlag) -> EquipmentResult<()> {
        self.move_shutter(ShutterState::Closing, ShutterState::Closed, cancel)
            .await
    }

    async fn park(&self, cancel: &CancellationFlag) -> EquipmentResult<()> {
        self.require(self.hub.get().can_park, "park")?;
        simulate(self.time_scale, Duration::from_secs(20), cancel).await?;
        self.hub.update(|info| {
            info.at_park = true;
            info.azimuth = 0.0;
        });
        Ok(())
    }

    async fn slew_to_azimuth(
        &self,
        azimuth: f64,
        cancel: &CancellationFlag,
    ) -> EquipmentResult<()> {
        self.require(self.hub.get().can_set_azimuth, "slew")?;
        let target = azimuth.rem_euclid(360.0);
        let distance = astro::azimuth_difference(self.hub.get().azimuth, target);
        self.hub.update(|info| info.slewing = true);
        let result =
            simulate(self.time_scale, crate::duration_from_secs(distance / 5.0), cancel).await;
        self.hub.update(|info| {
            info.slewing = false;
            if result.is_ok() {
                info.azimuth = target;
                info.at_park = false;
            }
        });
        result
    }
}

// =========================================================================
// SWITCH
// =========================================================================

pub struct SimulatedSwitch {
    hub: InfoHub<SwitchInfo>,
    time_scale: f64,
}

impl_session!(SimulatedSwitch, SwitchInfo);

impl SimulatedSwitch {
    pub fn new(options: &SimulatorOptions) -> Self {
        Self {
            hub: InfoHub::new(SwitchInfo {
                connected: true,
                name: "Switch Simulator".to_string(),
                switches: options.switches.clone(),
            }),
            time_scale: options.time_scale,
        }
    }
}

#[async_trait]
impl SwitchMediator for SimulatedSwitch {
    async fn set_value(
        &self,
        index: u16,
        value: f64,
        cancel: &CancellationFlag,
    ) -> EquipmentResult<()> {
        let info = self.hub.get();
        if !info.connected {
            return Err(EquipmentError::NotConnected("Switch".to_string()));
        }
        let port = info
            .port(index)
            .ok_or_else(|| EquipmentError::InvalidRequest(format!("no switch at index {}", index)))?;
        if !port.writable {
            return Err(EquipmentError::NotSupported {
                device: port.name.clone(),
                operation: "set a value".to_string(),
            });
        }
        if value < port.minimum || value > port.maximum {
            return Err(EquipmentError::InvalidRequest(format!(
                "{} outside {}..={}",
                value, port.minimum, port.maximum
            )));
        }

        simulate(self.time_scale, Duration::from_millis(200), cancel).await?;
        self.hub.update(|info| {
            if let Some(port) = info.switches.iter_mut().find(|s| s.index == index) {
                port.value = value;
            }
        });
        Ok(())
    }
}

/// A full set of simulated devices
///
/// Keeps the concrete types reachable so hosts and tests can adjust
/// simulated state; [`SimulatedEquipment::equipment`] hands out the trait
/// objects a run uses.
#[derive(Clone)]
pub struct SimulatedEquipment {
    pub camera: Arc<SimulatedCamera>,
    pub focuser: Arc<SimulatedFocuser>,
    pub telescope: Arc<SimulatedTelescope>,
    pub filter_wheel: Arc<SimulatedFilterWheel>,
    pub guider: Arc<SimulatedGuider>,
    pub dome: Arc<SimulatedDome>,
    pub switch: Arc<SimulatedSwitch>,
}

impl SimulatedEquipment {
    pub fn new(options: SimulatorOptions) -> Self {
        let filter_wheel = Arc::new(SimulatedFilterWheel::new(&options));
        Self {
            camera: Arc::new(SimulatedCamera::new(&options, Some(filter_wheel.clone()))),
            focuser: Arc::new(SimulatedFocuser::new(&options, Some(filter_wheel.clone()))),
            telescope: Arc::new(SimulatedTelescope::new(&options)),
            filter_wheel,
            guider: Arc::new(SimulatedGuider::new(&options)),
            dome: Arc::new(SimulatedDome::new(&options)),
            switch: Arc::new(SimulatedSwitch::new(&options)),
        }
    }

    pub fn equipment(&self) -> Equipment {
        Equipment {
            camera: self.camera.clone(),
            focuser: self.focuser.clone(),
            telescope: self.telescope.clone(),
            filter_wheel: self.filter_wheel.clone(),
            guider: self.guider.clone(),
            dome: self.dome.clone(),
            switch: self.switch.clone(),
        }
    }

    /// Mark every device as disconnected
    pub fn disconnect_all(&self) {
        self.camera.set_connected(false);
        self.focuser.set_connected(false);
        self.telescope.set_connected(false);
        self.filter_wheel.set_connected(false);
        self.guider.set_connected(false);
        self.dome.set_connected(false);
        self.switch.set_connected(false);
    }
}

impl Default for SimulatedEquipment {
    fn default() -> Self {
        Self::new(SimulatorOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_never_panics() {
        let minute = Duration::from_secs(60);
        assert_eq!(scaled(0.5, minute), Duration::from_secs(30));
        assert_eq!(scaled(f64::NAN, minute), Duration::ZERO);
        assert_eq!(scaled(-5.0, minute), Duration::ZERO);
        assert_eq!(scaled(f64::INFINITY, minute), Duration::MAX);
        assert_eq!(scaled(1e300, minute), Duration::MAX);
    }

    #[test]
    fn test_capture_block_is_exclusive() {
        let sim = SimulatedEquipment::default();
        let camera = sim.camera.clone();

        camera.register_capture_block("a").unwrap();
        assert!(camera.is_free_to_capture("a"));
        assert!(!camera.is_free_to_capture("b"));
        assert_eq!(
            camera.register_capture_block("b"),
            Err(EquipmentError::CaptureBlocked("a".to_string()))
        );

        // only the holder can release
        camera.release_capture_block("b");
        assert!(!camera.is_free_to_capture("b"));
        camera.release_capture_block("a");
        assert!(camera.is_free_to_capture("b"));
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let sim = SimulatedEquipment::default();
        let cancel = CancellationFlag::new();
        let request = CaptureRequest {
            exposure_time: 1.0,
            image_type: ImageType::Light,
            gain: None,
            offset: None,
            binning: 1,
        };

        sim.camera.inject_failures(1);
        assert!(sim.camera.capture(&request, &cancel).await.is_err());
        let frame = sim.camera.capture(&request, &cancel).await.unwrap();
        assert_eq!(frame.filter.as_deref(), Some("L"));
        assert_eq!(sim.camera.capture_count(), 1);
    }

    #[tokio::test]
    async fn test_focuser_rejects_out_of_range() {
        let sim = SimulatedEquipment::default();
        let cancel = CancellationFlag::new();
        assert!(sim.focuser.move_to(60_000, &cancel).await.is_err());
        assert_eq!(sim.focuser.move_relative(-500, &cancel).await.unwrap(), 24_500);
    }

    #[tokio::test]
    async fn test_parked_telescope_refuses_slew() {
        let sim = SimulatedEquipment::default();
        let cancel = CancellationFlag::new();
        sim.telescope.park(&cancel).await.unwrap();
        let result = sim
            .telescope
            .slew_to_coordinates(Coordinates::new(5.5, -5.4), &cancel)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_read_only_switch() {
        let sim = SimulatedEquipment::default();
        let cancel = CancellationFlag::new();
        assert!(sim.switch.set_value(1, 10.0, &cancel).await.is_err());
        sim.switch.set_value(0, 40.0, &cancel).await.unwrap();
        assert_eq!(sim.switch.get_info().port(0).unwrap().value, 40.0);
    }
}
