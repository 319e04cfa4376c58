/// Owned inventories of beacons and outputs plus the location mapping.
///
/// Built once from the configuration document. The ticker feeds beacon
/// counters through [`Registry::observe`] and the synchronize pass applies
/// every pending output in one batch.
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use embassy_time::Instant;

use crate::config::{Configuration, Mapping};
use crate::filter::{self, Beacon};
use crate::hal::{HttpTransport, Pins, WallClock};
use crate::output::Output;
use crate::protocol::{BeaconStatus, OutputStatus};
use crate::Error;

#[derive(Debug)]
pub struct Registry {
    beacons: Vec<Beacon>,
    /// Sorted by id, which fixes the assertion and activation order
    outputs: BTreeMap<String, Output>,
    mapping: Mapping,
}

impl Registry {
    /// Disabled outputs and outputs with incomplete settings are logged and
    /// left out.
    pub fn from_config(config: &Configuration, now: Instant) -> Self {
        let beacons = config
            .beacon
            .iter()
            .map(|(id, beacon)| Beacon::new(id, &beacon.name, beacon.enabled))
            .collect();

        let mut outputs = BTreeMap::new();
        for (id, entry) in &config.output {
            if !entry.enabled {
                log::info!("output {id} disabled");
                continue;
            }
            match entry.settings(id) {
                Ok(settings) => {
                    outputs.insert(id.clone(), Output::new(id, settings, entry.timeout, now));
                }
                Err(e) => log::error!("skipping output {id}: {e}"),
            }
        }

        Self {
            beacons,
            outputs,
            mapping: config.mapping.clone(),
        }
    }

    pub fn beacons(&self) -> &[Beacon] {
        &self.beacons
    }

    pub fn output(&self, id: &str) -> Option<&Output> {
        self.outputs.get(id)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Output> {
        self.outputs.values()
    }

    /// Run one captured frame through the matcher.
    pub fn record_frame(&mut self, raw: &[u8]) -> usize {
        filter::match_frame(raw, &mut self.beacons)
    }

    /// Ticker step: turn beacon counters into presence assertions for the
    /// current location, then re-check every output's idle timeout.
    ///
    /// Returns whether any output is now pending.
    pub fn observe(&mut self, location: Option<&str>, now: Instant) -> bool {
        for beacon in self.beacons.iter_mut() {
            if beacon.take_frames() == 0 {
                continue;
            }
            let Some(location) = location else {
                log::debug!("{} seen with no location", beacon.name);
                continue;
            };

            let Some(beacons) = self.mapping.get(location) else {
                log::error!("{}", Error::UnknownLocation(location.to_string()));
                continue;
            };
            let Some(ids) = beacons.get(&beacon.name) else {
                continue;
            };

            log::info!("L: {location} N: {}", beacon.name);
            for id in ids {
                match self.outputs.get_mut(id) {
                    Some(output) => output.assert(Some(true), now),
                    None => log::error!("{}", Error::UnknownOutput(id.clone())),
                }
            }
        }

        // Outputs outside the current mapping are checked too, so a location
        // change cannot leave one switched on
        for output in self.outputs.values_mut() {
            output.assert(None, now);
        }

        self.needs_sync()
    }

    pub fn needs_sync(&self) -> bool {
        self.outputs.values().any(Output::needs_sync)
    }

    /// Activate every pending output. Failures are logged and stay pending.
    ///
    /// Returns the number of outputs applied.
    pub fn synchronize<B>(&mut self, board: &mut B, now: Instant) -> usize
    where
        B: Pins + HttpTransport + WallClock,
    {
        let mut applied = 0;
        for output in self.outputs.values_mut().filter(|o| o.needs_sync()) {
            log::info!("S: {}", output.status(now));
            match output.activate(board, now) {
                Ok(()) => applied += 1,
                Err(e) => log::error!("{}: activation failed: {e}", output.id),
            }
        }
        applied
    }

    /// Mark every output pending regardless of its state.
    pub fn force_resync(&mut self) {
        for output in self.outputs.values_mut() {
            output.mark_pending();
        }
    }

    pub fn beacon_status(&self) -> Vec<BeaconStatus> {
        self.beacons
            .iter()
            .map(|b| BeaconStatus {
                id: b.id.clone(),
                name: b.name.clone(),
                enabled: b.enabled,
                frames: b.frames,
            })
            .collect()
    }

    pub fn output_status(&self, now: Instant) -> Vec<OutputStatus> {
        self.outputs.values().map(|o| o.status(now)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::SAMPLE;
    use crate::hal::mock::MockBoard;

    const BADGE: [u8; 6] = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];
    const KEYS: [u8; 6] = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66];

    fn at(secs: u64) -> Instant {
        Instant::from_secs(1_000 + secs)
    }

    fn frame_from(sender: [u8; 6]) -> Vec<u8> {
        let mut frame = alloc::vec![0x40, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        frame.extend_from_slice(&sender);
        frame.extend_from_slice(&[0xFF; 6]);
        frame
    }

    fn registry(json: &str) -> Registry {
        Registry::from_config(&Configuration::from_json(json.as_bytes()).unwrap(), at(0))
    }

    fn pending(registry: &Registry) -> Vec<&str> {
        registry
            .outputs()
            .filter(|o| o.needs_sync())
            .map(|o| o.id.as_str())
            .collect()
    }

    #[test]
    fn builds_inventories_from_config() {
        let registry = registry(SAMPLE);
        assert_eq!(registry.beacons().len(), 2);
        let ids: Vec<&str> = registry.outputs().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["heater", "porch_light", "status"]);
        assert!(!registry.needs_sync());
    }

    #[test]
    fn disabled_and_incomplete_outputs_are_skipped() {
        let registry = registry(
            r#"{"output":{
                "lamp": {"type":"gpio","pin":"D4","enabled":false},
                "plug": {"type":"cloud","client_id":"c"},
                "hook": {"type":"webhook","url":"http://example.com"},
                "fan":  {"type":"gpio","pin":"D5"}
            }}"#,
        );
        let ids: Vec<&str> = registry.outputs().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["fan"]);
    }

    #[test]
    fn seen_beacon_asserts_its_mapped_outputs() {
        let mut registry = registry(SAMPLE);
        assert_eq!(registry.record_frame(&frame_from(BADGE)), 1);

        assert!(registry.observe(Some("home"), at(1)));
        assert_eq!(pending(&registry), ["heater", "porch_light"]);
        assert!(registry.output("porch_light").unwrap().state().desired_on);
        assert_eq!(registry.beacons()[1].frames, 0);
    }

    #[test]
    fn disabled_beacon_asserts_nothing() {
        let mut registry = registry(SAMPLE);
        assert_eq!(registry.record_frame(&frame_from(KEYS)), 0);
        assert!(!registry.observe(Some("home"), at(1)));
    }

    #[test]
    fn unknown_location_skips_the_update() {
        let mut registry = registry(SAMPLE);
        registry.record_frame(&frame_from(BADGE));
        assert!(!registry.observe(Some("office"), at(1)));
        assert!(registry.beacons().iter().all(|b| b.frames == 0));
    }

    #[test]
    fn no_location_consumes_counters() {
        let mut registry = registry(SAMPLE);
        registry.record_frame(&frame_from(BADGE));
        assert!(!registry.observe(None, at(1)));
        assert!(registry.beacons().iter().all(|b| b.frames == 0));
    }

    #[test]
    fn unknown_output_in_mapping_is_skipped() {
        let mut registry = registry(
            r#"{
                "beacon": {"AA:BB:CC:DD:EE:FF": {"name":"badge1"}},
                "output": {"porch_light": {"type":"gpio","pin":"D4"}},
                "mapping": {"home": {"badge1": ["garage", "porch_light"]}}
            }"#,
        );
        registry.record_frame(&frame_from(BADGE));
        assert!(registry.observe(Some("home"), at(1)));
        assert_eq!(pending(&registry), ["porch_light"]);
    }

    #[test]
    fn unmapped_outputs_still_time_out() {
        let mut registry = registry(SAMPLE);
        assert!(registry.observe(Some("office"), at(61)));
        assert_eq!(pending(&registry), ["porch_light"]);
    }

    #[test]
    fn synchronize_applies_pending_and_keeps_failures() {
        let mut board = MockBoard::new();
        board.respond_json(500, "");
        let mut registry = registry(SAMPLE);
        registry.record_frame(&frame_from(BADGE));
        registry.observe(Some("home"), at(1));

        assert_eq!(registry.synchronize(&mut board, at(1)), 1);
        assert_eq!(board.levels.get("D4"), Some(&true));
        assert_eq!(pending(&registry), ["heater"]);
    }

    #[test]
    fn force_resync_marks_everything() {
        let mut board = MockBoard::new();
        let mut registry = registry(SAMPLE);
        registry.force_resync();
        assert_eq!(pending(&registry), ["heater", "porch_light", "status"]);

        board.respond_token("tok", 7200);
        board.respond_ok();
        assert_eq!(registry.synchronize(&mut board, at(1)), 3);
        assert_eq!(board.writes, [("D4".to_string(), false), ("D2".to_string(), false)]);
    }

    #[test]
    fn status_lists_beacons_and_outputs() {
        let mut registry = registry(SAMPLE);
        registry.record_frame(&frame_from(BADGE));
        let beacons = registry.beacon_status();
        let badge = beacons.iter().find(|b| b.name == "badge1").unwrap();
        assert_eq!(badge.frames, 1);

        let outputs = registry.output_status(at(5));
        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs[0].kind, "cloud");
        assert_eq!(outputs[0].idle, 5);
    }
}
