//! The bridge loop. One task owns every hub link, the sensor registry
//! and every upload sender; no locks, no parallel polls. Component
//! failures are logged and classified, never propagated: the loop only
//! stops when the shutdown channel fires.

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;

use anyhow::Context;
use wxlive::{HubLink, LinkSettings, RawCondition};

use crate::config::{BridgeConfig, UploadConfig};
use crate::normalize::normalize;
use crate::registry::{LogSink, SensorRegistry};
use crate::units::{RainCollector, UnitPreferences};
use crate::upload::{
    CwopSender, PwsSender, Sender, SenderKind, SenderSettings, SenderVariant, WundergroundSender,
};

/// Sleep between loop iterations.
const CYCLE_PAUSE: Duration = Duration::from_millis(100);

/// Mandatory gap between consecutive HTTP polls in one cycle, so a
/// config with many hubs never bursts requests.
const INTER_POLL_PAUSE: Duration = Duration::from_millis(500);

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Attach a log sink for every configured sensor, making its readings
/// cache and its lsid count as bound.
pub fn bind_configured_sensors(registry: &mut SensorRegistry, config: &BridgeConfig) {
    for sensor in &config.sensors {
        registry.bind(sensor.lsid, sensor.kind, Box::new(LogSink::new(&sensor.name)));
    }
}

/// Build one sender from its configuration tag.
fn build_sender(
    upload: &UploadConfig,
    config: &BridgeConfig,
    collector: RainCollector,
) -> anyhow::Result<Sender> {
    let iss = config
        .sensor_by_name(&upload.iss_sensor)
        .with_context(|| format!("upload '{}': unknown iss_sensor", upload.station_id))?;
    let baro = config
        .sensor_by_name(&upload.baro_sensor)
        .with_context(|| format!("upload '{}': unknown baro_sensor", upload.station_id))?;
    let password = upload.password.clone().unwrap_or_default();
    let host = upload.host.as_deref();

    let variant = match upload.kind {
        SenderKind::Cwop => {
            let station = config.station.with_context(|| {
                format!("upload '{}': CWOP requires a station location", upload.station_id)
            })?;
            SenderVariant::Cwop(CwopSender::new(
                &upload.station_id,
                host,
                upload.port,
                station.latitude,
                station.longitude,
            ))
        }
        SenderKind::Wunderground => SenderVariant::Wunderground(WundergroundSender::new(
            &upload.station_id,
            &password,
            host,
            upload.port,
        )?),
        SenderKind::PwsWeather => SenderVariant::PwsWeather(PwsSender::new(
            &upload.station_id,
            &password,
            host,
            upload.port,
        )?),
    };

    let settings = SenderSettings {
        name: format!("{} ({})", upload.station_id, upload.kind.label()),
        update_interval: upload.update_interval(),
        iss_lsid: iss.lsid,
        baro_lsid: baro.lsid,
        units: config.units,
        collector,
    };
    Ok(Sender::new(settings, variant))
}

/// Normalize a batch of condition records into the registry. Every lsid
/// is recorded in the discovery table; only bound ones are delivered.
fn ingest(
    registry: &mut SensorRegistry,
    collector: RainCollector,
    units: &UnitPreferences,
    conditions: Vec<RawCondition>,
) {
    for condition in conditions {
        registry.observe(condition.lsid, condition.data_structure_type);
        match normalize(&condition, collector, units) {
            Ok(reading) => {
                registry.dispatch(condition.lsid, &reading);
            }
            Err(err) => log::error!("sensor {}: reading dropped: {}", condition.lsid, err),
        }
    }
}

pub struct Dispatcher {
    links: Vec<HubLink>,
    senders: Vec<Sender>,
    registry: SensorRegistry,
    units: UnitPreferences,
    collector: RainCollector,
}

impl Dispatcher {
    pub fn from_config(config: &BridgeConfig, mut registry: SensorRegistry) -> anyhow::Result<Self> {
        let collector = config.collector()?;
        bind_configured_sensors(&mut registry, config);

        let mut links = Vec::with_capacity(config.hubs.len());
        for hub in &config.hubs {
            let link = HubLink::new(LinkSettings {
                name: hub.name.clone(),
                address: hub.address.clone(),
                http_port: hub.port,
                poll_interval: hub.poll_interval(),
                rounded_polling: hub.rounded_polling,
                udp_enabled: hub.enable_udp,
            })
            .with_context(|| format!("hub '{}'", hub.name))?;
            links.push(link);
        }

        let mut senders = Vec::with_capacity(config.uploads.len());
        for upload in &config.uploads {
            senders.push(build_sender(upload, config, collector)?);
        }

        Ok(Self {
            links,
            senders,
            registry,
            units: config.units,
            collector,
        })
    }

    pub fn links(&self) -> &[HubLink] {
        &self.links
    }

    pub fn senders(&self) -> &[Sender] {
        &self.senders
    }

    pub fn registry(&self) -> &SensorRegistry {
        &self.registry
    }

    /// Run until the shutdown channel fires.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<()>) {
        log::info!(
            "bridge running: {} hubs, {} bound sensors, {} uploads",
            self.links.len(),
            self.registry.list_bound(None).len(),
            self.senders.len()
        );
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(CYCLE_PAUSE) => {}
            }
            self.cycle().await;
        }
        self.stop();
    }

    /// One pass: drain broadcasts, run due polls, run due uploads.
    async fn cycle(&mut self) {
        for link in &mut self.links {
            loop {
                match link.receive_udp().await {
                    Ok(Some(conditions)) => {
                        ingest(&mut self.registry, self.collector, &self.units, conditions)
                    }
                    Ok(None) => break,
                    Err(err) => {
                        log::error!("{}: broadcast receive failed: {}", link.name(), err);
                        break;
                    }
                }
            }
        }

        let now = epoch_secs();
        let mut polled = false;
        for link in &mut self.links {
            if !link.poll_due(now) {
                continue;
            }
            if polled {
                tokio::time::sleep(INTER_POLL_PAUSE).await;
            }
            polled = true;
            match link.poll().await {
                Ok(conditions) => {
                    ingest(&mut self.registry, self.collector, &self.units, conditions);
                    // Keep the broadcast lease alive while polling succeeds.
                    if let Err(err) = link.start_realtime().await {
                        log::error!("{}: real-time request failed: {}", link.name(), err);
                    }
                }
                Err(err) => log::error!("{}: poll failed: {}", link.name(), err),
            }
        }

        let now = epoch_secs();
        for sender in &mut self.senders {
            sender.maybe_send(now, &self.registry).await;
        }

        if let Err(err) = self.registry.save_if_dirty() {
            log::error!("failed to save sensor table: {}", err);
        }
    }

    fn stop(&mut self) {
        for link in &mut self.links {
            link.shutdown();
        }
        for sender in &mut self.senders {
            sender.set_off();
        }
        if let Err(err) = self.registry.save_if_dirty() {
            log::error!("failed to save sensor table: {}", err);
        }
        log::info!("bridge stopped");
    }
}
