//! Scripted in-memory archive for pipeline tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use forecast_stack::{ArchiveConnector, ArchiveSession, TransportError};
use test_utils::{create_accumulated_precipitation, dwd_file_name, Grib2Builder};

#[derive(Default)]
struct State {
    /// directory -> files in listing order
    dirs: HashMap<String, Vec<(String, Bytes)>>,
    fail_connects: u32,
    fail_lists: u32,
    fail_navigations: u32,
    fail_retrievals: HashMap<String, u32>,
    fail_quit: bool,
    connects: u32,
    navigations: Vec<String>,
    lists: u32,
    retrievals: Vec<String>,
    quits: u32,
}

/// Archive whose failures are scripted per operation.
#[derive(Clone, Default)]
pub struct MockArchive {
    state: Arc<Mutex<State>>,
}

impl MockArchive {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn add_file(&self, dir: &str, name: &str, payload: Vec<u8>) {
        self.state()
            .dirs
            .entry(dir.to_string())
            .or_default()
            .push((name.to_string(), Bytes::from(payload)));
    }

    pub fn add_dir(&self, dir: &str) {
        self.state().dirs.entry(dir.to_string()).or_default();
    }

    pub fn fail_connects(&self, times: u32) {
        self.state().fail_connects = times;
    }

    pub fn fail_lists(&self, times: u32) {
        self.state().fail_lists = times;
    }

    pub fn fail_navigations(&self, times: u32) {
        self.state().fail_navigations = times;
    }

    /// Drop the transfer of `name` midway, `times` times.
    pub fn fail_retrieval(&self, name: &str, times: u32) {
        self.state().fail_retrievals.insert(name.to_string(), times);
    }

    pub fn fail_quit(&self) {
        self.state().fail_quit = true;
    }

    /// Connection attempts, successful or not.
    pub fn connects(&self) -> u32 {
        self.state().connects
    }

    /// Directories changed into, in order.
    pub fn navigations(&self) -> Vec<String> {
        self.state().navigations.clone()
    }

    pub fn lists(&self) -> u32 {
        self.state().lists
    }

    /// Retrieval attempts, in order.
    pub fn retrievals(&self) -> Vec<String> {
        self.state().retrievals.clone()
    }

    pub fn retrievals_of(&self, name: &str) -> usize {
        self.state().retrievals.iter().filter(|n| *n == name).count()
    }

    pub fn quits(&self) -> u32 {
        self.state().quits
    }
}

#[async_trait]
impl ArchiveConnector for MockArchive {
    type Session = MockSession;

    async fn connect(&self) -> Result<MockSession, TransportError> {
        let mut state = self.state();
        state.connects += 1;
        if state.fail_connects > 0 {
            state.fail_connects -= 1;
            return Err(TransportError::Connect {
                url: "mock://archive/".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(MockSession {
            archive: self.clone(),
            cwd: None,
        })
    }
}

pub struct MockSession {
    archive: MockArchive,
    cwd: Option<String>,
}

#[async_trait]
impl ArchiveSession for MockSession {
    async fn change_dir(&mut self, path: &str) -> Result<(), TransportError> {
        let mut state = self.archive.state();
        state.navigations.push(path.to_string());
        if state.fail_navigations > 0 {
            state.fail_navigations -= 1;
            return Err(TransportError::Navigate {
                path: path.to_string(),
                reason: "control connection lost".to_string(),
            });
        }
        if !state.dirs.contains_key(path) {
            return Err(TransportError::Navigate {
                path: path.to_string(),
                reason: "550 no such directory".to_string(),
            });
        }
        self.cwd = Some(path.to_string());
        Ok(())
    }

    async fn list(&mut self) -> Result<Vec<String>, TransportError> {
        let mut state = self.archive.state();
        state.lists += 1;
        let path = self.cwd.clone().unwrap_or_default();
        if state.fail_lists > 0 {
            state.fail_lists -= 1;
            return Err(TransportError::Listing {
                path,
                reason: "data connection reset".to_string(),
            });
        }
        Ok(state
            .dirs
            .get(&path)
            .map(|files| files.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default())
    }

    async fn retrieve(&mut self, name: &str) -> Result<Bytes, TransportError> {
        let mut state = self.archive.state();
        state.retrievals.push(name.to_string());

        if let Some(remaining) = state.fail_retrievals.get_mut(name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(TransportError::Retrieve {
                    name: name.to_string(),
                    reason: "connection reset by peer".to_string(),
                });
            }
        }

        let path = self.cwd.clone().unwrap_or_default();
        state
            .dirs
            .get(&path)
            .and_then(|files| files.iter().find(|(n, _)| n == name))
            .map(|(_, payload)| payload.clone())
            .ok_or_else(|| TransportError::Retrieve {
                name: name.to_string(),
                reason: "550 file not found".to_string(),
            })
    }

    async fn quit(&mut self) -> Result<(), TransportError> {
        let mut state = self.archive.state();
        state.quits += 1;
        if state.fail_quit {
            return Err(TransportError::Disconnect("421 timeout".to_string()));
        }
        Ok(())
    }
}

/// 2023-01-01 at `hour`:`minute` UTC.
pub fn jan_first(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 1, hour, minute, 0).unwrap()
}

/// bzip2'd precipitation field for `lead_hours` of the 06 run on 2023-01-01.
pub fn precipitation_payload(lead_hours: u32) -> Vec<u8> {
    Grib2Builder::new_regular_lat_lon()
        .with_reference_time(jan_first(6, 0))
        .with_forecast_hour(lead_hours)
        .with_data(create_accumulated_precipitation(5, 4, 42, lead_hours))
        .build_bz2()
}

/// Populate the icon-eu 06 run directory with `leads`, in that listing order,
/// plus an icosahedral file that must be filtered out. Returns the directory.
pub fn icon_eu_run(archive: &MockArchive, leads: &[u32]) -> String {
    let dir = "weather/nwp/icon-eu/grib/06/tot_prec/";
    archive.add_dir(dir);
    archive.add_file(
        dir,
        "icon-eu_europe_icosahedral_single-level_2023010106_000_TOT_PREC.grib2.bz2",
        b"not a regular grid".to_vec(),
    );
    for &lead in leads {
        archive.add_file(
            dir,
            &icon_eu_name(lead),
            precipitation_payload(lead),
        );
    }
    dir.to_string()
}

pub fn icon_eu_name(lead_hours: u32) -> String {
    dwd_file_name("icon-eu", "europe", "2023010106", lead_hours, "TOT_PREC")
}
