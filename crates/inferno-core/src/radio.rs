use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::bridge::{BridgeGateway, BridgePort};
use crate::error::{InfernoError, Result};
use crate::kv::{KvBackend, KvKey, KvNamespace, KvStore};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Station {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub genre: Option<String>,
}

impl Station {
    pub fn genre_label(&self) -> &str {
        self.genre
            .as_deref()
            .filter(|genre| !genre.is_empty())
            .unwrap_or("Internet Radio")
    }
}

/// What a live stream reports as currently on air.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RadioInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub station: Option<String>,
}

impl RadioInfo {
    pub fn song(&self) -> &str {
        self.title
            .as_deref()
            .filter(|title| !title.is_empty())
            .unwrap_or("Live Stream")
    }

    pub fn station_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.station
            .as_deref()
            .filter(|station| !station.is_empty())
            .unwrap_or(fallback)
    }
}

/// Backend default stations plus the ones the user added by hand.
pub struct StationDirectory<B: KvBackend> {
    store: KvStore<B>,
    stations: Vec<Station>,
}

impl<B: KvBackend> StationDirectory<B> {
    pub fn new(store: KvStore<B>) -> Self {
        Self {
            store,
            stations: Vec::new(),
        }
    }

    pub async fn load<P: BridgePort>(&mut self, gateway: &BridgeGateway<P>) -> Result<&[Station]> {
        let mut stations = match gateway.default_radios().await {
            Ok(stations) => stations,
            Err(err) => {
                warn!(%err, "default stations unavailable");
                Vec::new()
            }
        };

        for custom in self.store.load_all::<Station>(KvNamespace::Station).await? {
            if !stations.iter().any(|known| known.url == custom.url) {
                stations.push(custom);
            }
        }

        self.stations = stations;
        Ok(&self.stations)
    }

    pub async fn add_custom(&mut self, name: &str, url: &str) -> Result<&Station> {
        let (name, url) = (name.trim(), url.trim());
        if name.is_empty() || url.is_empty() {
            return Err(InfernoError::Input(
                "a station needs both a name and a stream url".into(),
            ));
        }

        let station = Station {
            name: name.to_owned(),
            url: url.to_owned(),
            genre: Some("Manual Entry".into()),
        };
        self.store
            .store(&KvKey::new(KvNamespace::Station, url), &station)
            .await?;

        self.stations.retain(|known| known.url != station.url);
        self.stations.push(station);
        Ok(&self.stations[self.stations.len() - 1])
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }
}
