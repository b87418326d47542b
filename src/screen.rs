use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::booking::ScreenId;

/// Read side of the screen catalogue. The booking core never edits screens; it
/// only reads the current rate/status and bumps the advertisement counter.
pub trait ScreenAvailability: Send + Sync {
    fn get(&self, screen_id: ScreenId) -> Option<Screen>;

    /// Best-effort counter; the caller logs failures and carries on.
    fn record_advertisement(&self, screen_id: ScreenId) -> Result<(), String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenStatus {
    Active,
    Maintenance,
    OutOfService,
}

impl fmt::Display for ScreenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScreenStatus::Active => "active",
            ScreenStatus::Maintenance => "maintenance",
            ScreenStatus::OutOfService => "out_of_service",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Screen {
    #[serde(rename = "screen")]
    id: ScreenId,
    daily_price: Option<Decimal>,
    status: ScreenStatus,
}

impl Screen {
    pub fn new(id: ScreenId, daily_price: Option<Decimal>, status: ScreenStatus) -> Self {
        Self {
            id,
            daily_price,
            status,
        }
    }

    pub fn id(&self) -> ScreenId {
        self.id
    }

    pub fn daily_price(&self) -> Option<Decimal> {
        self.daily_price
    }

    pub fn status(&self) -> ScreenStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == ScreenStatus::Active
    }
}

#[derive(Default)]
pub struct ScreenCatalog {
    screens: HashMap<ScreenId, Screen>,
    advertisements: HashMap<ScreenId, AtomicU64>,
}

impl ScreenCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, screen: Screen) {
        self.advertisements
            .entry(screen.id())
            .or_insert_with(|| AtomicU64::new(0));
        self.screens.insert(screen.id(), screen);
    }

    pub fn len(&self) -> usize {
        self.screens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.screens.is_empty()
    }

    pub fn advertisement_count(&self, screen_id: ScreenId) -> u64 {
        self.advertisements
            .get(&screen_id)
            .map_or(0, |count| count.load(Ordering::Relaxed))
    }
}

impl FromIterator<Screen> for ScreenCatalog {
    fn from_iter<I: IntoIterator<Item = Screen>>(iter: I) -> Self {
        let mut catalog = ScreenCatalog::new();
        for screen in iter {
            catalog.insert(screen);
        }
        catalog
    }
}

impl ScreenAvailability for ScreenCatalog {
    fn get(&self, screen_id: ScreenId) -> Option<Screen> {
        self.screens.get(&screen_id).cloned()
    }

    fn record_advertisement(&self, screen_id: ScreenId) -> Result<(), String> {
        match self.advertisements.get(&screen_id) {
            Some(count) => {
                count.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            None => Err(format!("no advertisement counter for screen {screen_id}")),
        }
    }
}
