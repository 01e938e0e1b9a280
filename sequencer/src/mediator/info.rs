//! Immutable device snapshots published by the mediators

use crate::astro::Coordinates;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CameraInfo {
    pub connected: bool,
    pub name: String,
    /// Sensor temperature in Celsius
    pub temperature: f64,
    pub target_temperature: Option<f64>,
    pub cooler_on: bool,
    /// Cooler power in percent
    pub cooler_power: f64,
    pub can_set_temperature: bool,
    pub is_exposing: bool,
    pub gain: i32,
    pub offset: i32,
    pub max_bin: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageType {
    #[default]
    Light,
    Dark,
    Flat,
    Bias,
}

/// Parameters of a single exposure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub exposure_time: f64,
    pub image_type: ImageType,
    pub gain: Option<i32>,
    pub offset: Option<i32>,
    pub binning: u16,
}

/// Metadata of a finished exposure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedFrame {
    pub exposure_time: f64,
    pub image_type: ImageType,
    pub filter: Option<String>,
    pub started_at: DateTime<Utc>,
    pub hfr: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FocuserInfo {
    pub connected: bool,
    pub name: String,
    pub position: i32,
    pub max_step: i32,
    pub temperature: Option<f64>,
    pub is_moving: bool,
}

/// Result of an autofocus run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutofocusReport {
    pub position: i32,
    pub hfr: f64,
    pub temperature: Option<f64>,
    pub filter: Option<String>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrackingMode {
    #[default]
    Sidereal,
    Lunar,
    Solar,
    King,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TelescopeInfo {
    pub connected: bool,
    pub name: String,
    pub coordinates: Option<Coordinates>,
    pub altitude: f64,
    pub azimuth: f64,
    pub at_park: bool,
    pub slewing: bool,
    pub tracking_mode: TrackingMode,
    pub can_park: bool,
    pub can_set_tracking: bool,
}

impl TelescopeInfo {
    pub fn is_tracking(&self) -> bool {
        self.tracking_mode != TrackingMode::Stopped
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterWheelInfo {
    pub connected: bool,
    pub name: String,
    pub filters: Vec<String>,
    pub selected_filter: Option<String>,
    pub is_moving: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GuiderInfo {
    pub connected: bool,
    pub name: String,
    pub is_guiding: bool,
    pub is_dithering: bool,
    /// Total guiding RMS in arcseconds
    pub rms_total: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShutterState {
    Open,
    #[default]
    Closed,
    Opening,
    Closing,
    Error,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DomeInfo {
    pub connected: bool,
    pub name: String,
    pub shutter: ShutterState,
    pub azimuth: f64,
    pub at_park: bool,
    pub slewing: bool,
    pub can_set_shutter: bool,
    pub can_park: bool,
    pub can_set_azimuth: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SwitchPort {
    pub index: u16,
    pub name: String,
    pub value: f64,
    pub minimum: f64,
    pub maximum: f64,
    pub writable: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SwitchInfo {
    pub connected: bool,
    pub name: String,
    pub switches: Vec<SwitchPort>,
}

impl SwitchInfo {
    pub fn port(&self, index: u16) -> Option<&SwitchPort> {
        self.switches.iter().find(|s| s.index == index)
    }
}
