#[cfg(test)]
mod helpers {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use anyhow::{Context, Result};

    use crate::port::{DeviceIo, MemoryTransport};
    use crate::registry::DriverRegistry;
    use crate::slot::DeviceSlot;

    pub const RMC: &str = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";
    pub const RMC_VOID: &str =
        "$GPRMC,123519,V,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*7D";
    pub const GNRMC: &str =
        "$GNRMC,093000.50,A,5130.000,S,00010.500,W,010.0,180.0,010524,,,A*49";
    pub const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
    pub const GGA_NO_FIX: &str = "$GPGGA,123519,4807.038,N,01131.000,E,0,00,,,M,,M,,*52";
    pub const PGRMZ: &str = "$PGRMZ,1500,f,3*2F";
    pub const CAI_W: &str = "!w,270,150,5,500,1850,1013,2500,230,210,220,20,50,10*66";
    pub const PDVDV: &str = "$PDVDV,15,10,250,1100,1234*4A";
    pub const PDVWI: &str = "$PDVWI,270,80*61";

    pub const LINK_WINDOW: Duration = Duration::from_secs(10);

    pub fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    /// Slot 0 bound to `port` with the registered driver `name`.
    pub fn bound_slot(
        registry: &DriverRegistry,
        name: &str,
        transport: &MemoryTransport,
        port: &str,
        now: Instant,
    ) -> Result<DeviceSlot> {
        let descriptor = registry
            .lookup(name)
            .cloned()
            .with_context(|| format!("driver {name} not registered"))?;
        let io = DeviceIo::new(
            port,
            Arc::new(transport.clone()),
            Duration::from_millis(50),
        );
        let mut slot = DeviceSlot::new(0, LINK_WINDOW);
        slot.bind(descriptor, io, now);
        Ok(slot)
    }

    /// A CAI 302 that answers every command with its prompt.
    pub fn cai302_prompts(transport: &MemoryTransport, port: &str) {
        transport.respond(port, "\x03", "cmd>");
        transport.respond(port, "\r", "cmd>");
    }

    /// An EW recorder that acknowledges every record.
    pub fn ew_acks(transport: &MemoryTransport, port: &str) {
        transport.respond(port, "##", "IO Mode.");
        transport.respond(port, "#SPI", "OK");
        transport.respond(port, "#SUI", "OK");
        transport.respond(port, "#END", "OK");
    }

    pub fn waypoint(number: u32, name: &str) -> crate::declaration::Waypoint {
        crate::declaration::Waypoint {
            number,
            name: name.to_string(),
            latitude: 47.0 + f64::from(number) / 100.0,
            longitude: 8.0 + f64::from(number) / 100.0,
            altitude: 500.0,
            flags: crate::declaration::WaypointFlags::TURNPOINT,
            comment: None,
        }
    }
}

#[cfg(test)]
mod nmea_tests {
    use crate::nmea::{self, Sentence};
    use anyhow::{Context, Result};

    use super::helpers::*;

    #[test]
    fn test_checksum_and_framing() -> Result<()> {
        assert_eq!(nmea::checksum("PGRMZ,1500,f,3"), 0x2F);
        assert_eq!(nmea::sentence("PGRMZ,1500,f,3"), "$PGRMZ,1500,f,3*2F\r\n");
        Ok(())
    }

    #[test]
    fn test_sentence_split() -> Result<()> {
        let sentence = Sentence::parse(RMC).context("RMC should parse")?;
        assert_eq!(sentence.address(), "GPRMC");
        assert_eq!(sentence.kind(), "RMC");
        assert_eq!(sentence.field(1), Some("A"));
        assert_eq!(sentence.len(), 11);

        let proprietary = Sentence::parse(PGRMZ).context("PGRMZ should parse")?;
        assert_eq!(proprietary.kind(), "PGRMZ");

        let cai = Sentence::parse(CAI_W).context("!w should parse")?;
        assert_eq!(cai.address(), "w");
        Ok(())
    }

    #[test]
    fn test_sentence_rejects_bad_input() -> Result<()> {
        assert!(Sentence::parse("").is_none());
        assert!(Sentence::parse("GPRMC,123519,A").is_none());
        assert!(Sentence::parse("$,1,2").is_none());
        // Checksum mismatch
        assert!(Sentence::parse("$PGRMZ,1500,f,3*2E").is_none());
        // Garbage checksum
        assert!(Sentence::parse("$PGRMZ,1500,f,3*ZZ").is_none());
        // No checksum at all is accepted
        assert!(Sentence::parse("$PGRMZ,1500,f,3").is_some());
        Ok(())
    }

    #[test]
    fn test_coordinates() -> Result<()> {
        let lat = nmea::parse_latitude("4807.038", "N").context("latitude")?;
        assert!(approx(lat, 48.0 + 7.038 / 60.0));
        let lon = nmea::parse_longitude("01131.000", "W").context("longitude")?;
        assert!(approx(lon, -(11.0 + 31.0 / 60.0)));

        assert!(nmea::parse_latitude("4807.038", "E").is_none());
        assert!(nmea::parse_latitude("4875.000", "N").is_none());
        assert!(nmea::parse_latitude("9130.000", "N").is_none());
        assert!(nmea::parse_longitude("11", "E").is_none());
        Ok(())
    }

    #[test]
    fn test_time_and_date() -> Result<()> {
        let time = nmea::parse_time("093000.50").context("time")?;
        assert_eq!(time.to_string(), "09:30:00.500");
        assert!(nmea::parse_time("256000").is_none());
        assert!(nmea::parse_time("12").is_none());

        let date = nmea::parse_date("010524").context("date")?;
        assert_eq!(date.to_string(), "2024-05-01");
        assert!(nmea::parse_date("320524").is_none());
        Ok(())
    }
}

#[cfg(test)]
mod registry_tests {
    use crate::registry::{Capabilities, DriverKind, DriverRegistry, NUMREGDEV};
    use anyhow::{Context, Result};

    #[test]
    fn test_builtin_registry() -> Result<()> {
        let registry = DriverRegistry::builtin();
        assert_eq!(registry.len(), 4);

        let cai = registry.lookup("CAI 302").context("CAI 302 missing")?;
        assert_eq!(cai.kind(), DriverKind::Cai302);
        assert!(cai.has(Capabilities::LOGGER | Capabilities::MAC_CREADY));

        let vega = registry.lookup("Vega").context("Vega missing")?;
        assert!(!vega.has(Capabilities::LOGGER));
        assert!(!vega.has(Capabilities::GPS));

        assert!(registry.lookup("vega").is_none());
        Ok(())
    }

    #[test]
    fn test_duplicate_name_rejected() -> Result<()> {
        let mut registry = DriverRegistry::new();
        assert!(registry.register("GenericNMEA", Capabilities::GPS));
        assert!(!registry.register("GenericNMEA", Capabilities::GPS | Capabilities::VARIO));

        assert_eq!(registry.len(), 1);
        let descriptor = registry.lookup("GenericNMEA").context("not registered")?;
        assert_eq!(descriptor.capabilities(), Capabilities::GPS);
        assert_eq!(descriptor.kind(), DriverKind::Generic);
        Ok(())
    }

    #[test]
    fn test_capacity_enforced() -> Result<()> {
        let mut registry = DriverRegistry::new();
        for i in 0..NUMREGDEV {
            assert!(registry.register(format!("Driver {i}"), Capabilities::GPS));
        }
        assert!(registry.is_full());
        assert!(!registry.register("One too many", Capabilities::GPS));
        assert_eq!(registry.len(), NUMREGDEV);
        assert!(registry.lookup("One too many").is_none());
        Ok(())
    }

    #[test]
    fn test_kind_names_round_trip() -> Result<()> {
        let kind: DriverKind = "EW Logger".parse()?;
        assert_eq!(kind, DriverKind::Ew);
        assert_eq!(DriverKind::Cai302.to_string(), "CAI 302");
        assert_eq!(
            Capabilities::GPS.union(Capabilities::WIND).names(),
            vec!["GPS", "WIND"]
        );
        Ok(())
    }
}

#[cfg(test)]
mod dispatch_tests {
    use std::time::{Duration, Instant};

    use crate::drivers::Operation;
    use crate::fix::NavFix;
    use crate::port::MemoryTransport;
    use crate::registry::{Capabilities, DriverKind, DriverRegistry};
    use crate::slot::DeviceSlot;
    use anyhow::{Context, Result};

    use super::helpers::*;

    #[test]
    fn test_unbound_slot_handles_nothing() -> Result<()> {
        let mut slot = DeviceSlot::new(1, LINK_WINDOW);
        let mut fix = NavFix::new();

        assert!(!slot.parse_line(RMC, &mut fix));
        assert!(fix.is_empty());
        assert!(!slot.put_mac_cready(1.0));
        assert!(!slot.put_bugs(0.9));
        assert!(!slot.put_ballast(0.5));
        assert!(!slot.open());
        assert!(!slot.close());
        assert!(!slot.init());
        assert!(!slot.link_timeout());
        assert!(!slot.is_logger());
        assert!(!slot.is_gps_source());
        assert!(slot.check_link(Instant::now()).is_none());
        Ok(())
    }

    #[test]
    fn test_generic_rmc_and_gga() -> Result<()> {
        let registry = DriverRegistry::builtin();
        let transport = MemoryTransport::new();
        let mut slot = bound_slot(&registry, "Generic", &transport, "COM1", Instant::now())?;

        let mut fix = NavFix::new();
        assert!(slot.parse_line(RMC, &mut fix));
        assert!(approx(fix.latitude.context("latitude")?, 48.0 + 7.038 / 60.0));
        assert!(approx(fix.longitude.context("longitude")?, 11.0 + 31.0 / 60.0));
        assert!(approx(fix.ground_speed.context("speed")?, 22.4 * 0.514_444));
        assert!(approx(fix.track.context("track")?, 84.4));
        assert!(fix.vario.is_none());

        let mut fix = NavFix::new();
        assert!(slot.parse_line(GGA, &mut fix));
        assert_eq!(fix.satellites, Some(8));
        assert!(approx(fix.gps_altitude.context("altitude")?, 545.4));

        let mut fix = NavFix::new();
        assert!(slot.parse_line(GNRMC, &mut fix));
        assert!(fix.latitude.context("latitude")? < 0.0);
        assert!(fix.longitude.context("longitude")? < 0.0);
        assert_eq!(fix.date.map(|d| d.to_string()), Some("2024-05-01".to_string()));

        let mut fix = NavFix::new();
        assert!(slot.parse_line(PGRMZ, &mut fix));
        assert!(approx(fix.baro_altitude.context("baro")?, 1500.0 * 0.3048));
        assert!(!fix.has_position());
        Ok(())
    }

    #[test]
    fn test_invalid_fixes_are_not_reported() -> Result<()> {
        let registry = DriverRegistry::builtin();
        let transport = MemoryTransport::new();
        let mut slot = bound_slot(&registry, "Generic", &transport, "COM1", Instant::now())?;

        let mut fix = NavFix::new();
        assert!(!slot.parse_line(RMC_VOID, &mut fix));
        assert!(!slot.parse_line(GGA_NO_FIX, &mut fix));
        assert!(!slot.parse_line(CAI_W, &mut fix));
        assert!(fix.is_empty());
        Ok(())
    }

    #[test]
    fn test_malformed_lines_leave_fix_untouched() -> Result<()> {
        let registry = DriverRegistry::builtin();
        let transport = MemoryTransport::new();
        let mut slot = bound_slot(&registry, "Generic", &transport, "COM1", Instant::now())?;

        let mut fix = NavFix {
            latitude: Some(1.0),
            longitude: Some(2.0),
            vario: Some(0.5),
            ..NavFix::default()
        };
        let before = fix.clone();

        for line in [
            "",
            "\r\n",
            "$GPRMC,123519,A,4807.038,N",
            "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6B",
            "$GPGGA,123519,48xx.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,",
            "\u{fffd}\u{fffd}garbage",
        ] {
            assert!(!slot.parse_line(line, &mut fix), "accepted {line:?}");
            assert_eq!(fix, before);
        }

        // A corrupt line does not poison the next one.
        assert!(slot.parse_line(RMC, &mut fix));
        assert!(approx(fix.latitude.context("latitude")?, 48.0 + 7.038 / 60.0));
        // Fields the sentence does not carry are kept.
        assert_eq!(fix.vario, Some(0.5));
        Ok(())
    }

    #[test]
    fn test_cai302_instrument_sentence() -> Result<()> {
        let registry = DriverRegistry::builtin();
        let transport = MemoryTransport::new();
        let mut slot = bound_slot(&registry, "CAI 302", &transport, "COM2", Instant::now())?;

        let mut fix = NavFix::new();
        assert!(slot.parse_line(CAI_W, &mut fix));
        let wind = fix.wind.context("wind")?;
        assert!(approx(wind.bearing, 270.0));
        assert!(approx(wind.speed, 15.0));
        assert!(approx(fix.baro_altitude.context("altitude")?, 850.0));
        assert!(approx(fix.true_airspeed.context("tas")?, 25.0));
        assert!(approx(fix.vario.context("vario")?, 3.0 * 0.514_444));
        assert!(approx(fix.mac_cready.context("mc")?, 2.0 * 0.514_444));
        assert!(approx(fix.ballast.context("ballast")?, 0.5));
        assert!(approx(fix.bugs.context("bugs")?, 0.9));

        // GPS sentences pass through.
        let mut fix = NavFix::new();
        assert!(slot.parse_line(GGA, &mut fix));
        assert!(fix.has_position());

        // Truncated instrument sentence
        assert!(!slot.parse_line("!w,270,150,5", &mut fix));
        Ok(())
    }

    #[test]
    fn test_vega_sentences() -> Result<()> {
        let registry = DriverRegistry::builtin();
        let transport = MemoryTransport::new();
        let mut slot = bound_slot(&registry, "Vega", &transport, "COM3", Instant::now())?;

        let mut fix = NavFix::new();
        assert!(slot.parse_line(PDVDV, &mut fix));
        assert!(approx(fix.vario.context("vario")?, 1.5));
        assert!(approx(fix.netto_vario.context("netto")?, 1.0));
        assert!(approx(fix.indicated_airspeed.context("ias")?, 25.0));
        assert!(approx(fix.true_airspeed.context("tas")?, 25.0 * 1100.0 / 1024.0));
        assert!(approx(fix.baro_altitude.context("alt")?, 1234.0));

        let mut fix = NavFix::new();
        assert!(slot.parse_line(PDVWI, &mut fix));
        let wind = fix.wind.context("wind")?;
        assert!(approx(wind.speed, 8.0));

        assert!(!slot.is_gps_source());
        assert!(!slot.is_logger());
        Ok(())
    }

    #[test]
    fn test_settings_gated_by_capability() -> Result<()> {
        let mut registry = DriverRegistry::builtin();
        // Claims MacCready support but the generic parser cannot send it.
        assert!(registry.register("Boasting GPS", Capabilities::GPS | Capabilities::MAC_CREADY));
        // Vega protocol with the settings capabilities withheld.
        assert!(registry.register_kind(
            "Vega (read only)",
            DriverKind::Vega,
            Capabilities::VARIO | Capabilities::BARO_ALT,
        ));

        let transport = MemoryTransport::new();
        for (name, port) in [
            ("Generic", "COM1"),
            ("Boasting GPS", "COM2"),
            ("Vega (read only)", "COM3"),
        ] {
            let mut slot = bound_slot(&registry, name, &transport, port, Instant::now())?;
            assert!(slot.open());
            assert!(!slot.permits(Operation::PutMacCready));
            assert!(!slot.put_mac_cready(1.5), "{name} accepted MacCready");
            assert!(!slot.put_bugs(0.9));
            assert!(!slot.put_ballast(0.3));
            assert_eq!(transport.written(port), "", "{name} reached the device");
        }
        Ok(())
    }

    #[test]
    fn test_settings_forwarded() -> Result<()> {
        let registry = DriverRegistry::builtin();
        let transport = MemoryTransport::new();

        let mut vega = bound_slot(&registry, "Vega", &transport, "COM1", Instant::now())?;
        assert!(vega.open());
        assert!(vega.put_mac_cready(1.5));
        assert!(vega.put_ballast(0.25));
        assert!(vega.put_bugs(0.95));
        let written = transport.written("COM1");
        assert!(written.contains("$PDVMC,15*"));
        assert!(written.contains("$PDVBL,250*"));
        assert!(written.contains("$PDVBG,95*"));

        let mut cai = bound_slot(&registry, "CAI 302", &transport, "COM2", Instant::now())?;
        assert!(cai.open());
        assert!(cai.put_mac_cready(2.0 * 0.514_444));
        assert!(cai.put_ballast(0.5));
        assert!(cai.put_bugs(0.9));
        let written = transport.written("COM2");
        assert!(written.contains("!g,m20\r"));
        assert!(written.contains("!g,b5\r"));
        assert!(written.contains("!g,u10\r"));
        Ok(())
    }

    #[test]
    fn test_write_on_closed_port_fails() -> Result<()> {
        let registry = DriverRegistry::builtin();
        let transport = MemoryTransport::new();
        let mut slot = bound_slot(&registry, "Vega", &transport, "COM1", Instant::now())?;

        // Supported and permitted, but the device is not reachable.
        assert!(!slot.put_mac_cready(1.0));

        assert!(slot.connect());
        assert!(transport.written("COM1").contains("$PDVSC,R,Version*"));
        assert!(slot.close());
        assert!(!transport.is_open("COM1"));
        assert!(!slot.put_mac_cready(1.0));
        Ok(())
    }

    #[test]
    fn test_open_failure_reported() -> Result<()> {
        let registry = DriverRegistry::builtin();
        let transport = MemoryTransport::new();
        transport.set_fail_open("COM9", true);
        let mut slot = bound_slot(&registry, "Generic", &transport, "COM9", Instant::now())?;

        assert!(!slot.open());
        assert!(!slot.is_open());
        assert!(!slot.connect());

        transport.set_fail_open("COM9", false);
        assert!(slot.connect());
        assert!(slot.is_open());
        Ok(())
    }

    #[test]
    fn test_rebind_closes_previous_port() -> Result<()> {
        let registry = DriverRegistry::builtin();
        let transport = MemoryTransport::new();
        let mut slot = bound_slot(&registry, "Generic", &transport, "COM1", Instant::now())?;
        assert!(slot.open());
        assert!(transport.is_open("COM1"));

        let descriptor = registry.lookup("Vega").cloned().context("Vega missing")?;
        let io = crate::port::DeviceIo::new(
            "COM2",
            std::sync::Arc::new(transport.clone()),
            Duration::from_millis(50),
        );
        slot.bind(descriptor, io, Instant::now());

        assert!(!transport.is_open("COM1"));
        assert_eq!(slot.port(), Some("COM2"));
        assert_eq!(slot.name(), Some("Vega"));
        assert!(!slot.is_open());
        Ok(())
    }
}

#[cfg(test)]
mod link_tests {
    use std::time::{Duration, Instant};

    use crate::fix::NavFix;
    use crate::link::{LinkMonitor, LinkStatus};
    use crate::port::MemoryTransport;
    use crate::registry::DriverRegistry;
    use anyhow::Result;

    use super::helpers::*;

    #[test]
    fn test_window_boundary() -> Result<()> {
        let t0 = Instant::now();
        let monitor = LinkMonitor::new(LINK_WINDOW, t0);

        assert_eq!(monitor.status(), LinkStatus::Live);
        assert!(!monitor.is_expired(t0));
        assert!(!monitor.is_expired(t0 + LINK_WINDOW - Duration::from_millis(1)));
        assert!(monitor.is_expired(t0 + LINK_WINDOW));
        assert!(monitor.is_expired(t0 + LINK_WINDOW * 3));
        Ok(())
    }

    #[test]
    fn test_times_out_and_recovers_on_fix() -> Result<()> {
        let registry = DriverRegistry::builtin();
        let transport = MemoryTransport::new();
        let t0 = Instant::now();
        let mut slot = bound_slot(&registry, "Generic", &transport, "COM1", t0)?;
        // Reopening will not help.
        transport.set_fail_open("COM1", true);

        let before = t0 + LINK_WINDOW - Duration::from_millis(1);
        assert_eq!(slot.check_link(before), Some(LinkStatus::Live));
        assert_eq!(slot.link().timeouts(), 0);

        assert_eq!(slot.check_link(t0 + LINK_WINDOW), Some(LinkStatus::TimedOut));
        assert_eq!(slot.link().timeouts(), 1);

        // Every further tick retries and counts.
        let later = t0 + LINK_WINDOW + Duration::from_secs(1);
        assert_eq!(slot.check_link(later), Some(LinkStatus::TimedOut));
        assert_eq!(slot.link().timeouts(), 2);

        let mut fix = NavFix::new();
        let fixed_at = later + Duration::from_secs(1);
        assert!(slot.parse_line_at(RMC, &mut fix, fixed_at));
        assert_eq!(slot.link_status(), LinkStatus::Live);
        assert_eq!(slot.link().timeouts(), 0);

        // A fresh window starts at the fix.
        assert_eq!(
            slot.check_link(fixed_at + LINK_WINDOW - Duration::from_millis(1)),
            Some(LinkStatus::Live)
        );
        Ok(())
    }

    #[test]
    fn test_failed_parse_does_not_feed_the_link() -> Result<()> {
        let registry = DriverRegistry::builtin();
        let transport = MemoryTransport::new();
        let t0 = Instant::now();
        let mut slot = bound_slot(&registry, "Generic", &transport, "COM1", t0)?;
        transport.set_fail_open("COM1", true);

        let mut fix = NavFix::new();
        assert!(!slot.parse_line_at(RMC_VOID, &mut fix, t0 + LINK_WINDOW / 2));
        assert_eq!(slot.check_link(t0 + LINK_WINDOW), Some(LinkStatus::TimedOut));
        Ok(())
    }

    #[test]
    fn test_reopen_recovers_link() -> Result<()> {
        let registry = DriverRegistry::builtin();
        let transport = MemoryTransport::new();
        let t0 = Instant::now();
        let mut slot = bound_slot(&registry, "Generic", &transport, "COM1", t0)?;
        assert!(slot.open());
        assert_eq!(transport.open_count("COM1"), 1);

        let expired = t0 + LINK_WINDOW;
        assert_eq!(slot.check_link(expired), Some(LinkStatus::Live));
        assert_eq!(transport.open_count("COM1"), 2);
        assert_eq!(slot.link().timeouts(), 1);

        // The recovery opened a new window.
        assert_eq!(
            slot.check_link(expired + LINK_WINDOW / 2),
            Some(LinkStatus::Live)
        );
        assert_eq!(transport.open_count("COM1"), 2);
        Ok(())
    }
}

#[cfg(test)]
mod declaration_tests {
    use std::time::Instant;

    use crate::declaration::{Declaration, DeclarationPhase};
    use crate::port::MemoryTransport;
    use crate::registry::DriverRegistry;
    use anyhow::{Context, Result};

    use super::helpers::*;

    #[test]
    fn test_full_declaration_cai302() -> Result<()> {
        let registry = DriverRegistry::builtin();
        let transport = MemoryTransport::new();
        cai302_prompts(&transport, "COM1");
        let mut slot = bound_slot(&registry, "CAI 302", &transport, "COM1", Instant::now())?;
        assert!(slot.open());

        assert!(slot.declare_begin("Jane Doe", "Standard", "D-1234"));
        assert_eq!(slot.declaration_phase(), DeclarationPhase::Begun);

        for (i, name) in ["Start", "TP1", "Finish"].iter().enumerate() {
            assert!(slot.declare_add_waypoint(&waypoint(i as u32 + 1, name)));
            assert_eq!(slot.declaration_phase(), DeclarationPhase::Adding);
        }
        assert!(slot.declare_end());
        assert_eq!(slot.declaration_phase(), DeclarationPhase::Ended);

        let session = slot.session().context("session missing")?;
        assert_eq!(session.pilot(), "Jane Doe");
        let names: Vec<&str> = session.waypoints().iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["Start", "TP1", "Finish"]);

        let written = transport.written("COM1");
        assert!(written.contains("O,Jane Doe,Standard,D-1234\r"));
        let start = written.find("Start").context("start not sent")?;
        let finish = written.find("Finish").context("finish not sent")?;
        assert!(start < finish);
        assert!(written.contains("D,255\r"));
        Ok(())
    }

    #[test]
    fn test_empty_task_accepted_by_cai302() -> Result<()> {
        let registry = DriverRegistry::builtin();
        let transport = MemoryTransport::new();
        cai302_prompts(&transport, "COM1");
        let mut slot = bound_slot(&registry, "CAI 302", &transport, "COM1", Instant::now())?;
        assert!(slot.open());

        assert!(slot.declare_begin("Pilot", "Club", "X"));
        assert!(slot.declare_end());
        assert_eq!(slot.declaration_phase(), DeclarationPhase::Ended);
        Ok(())
    }

    #[test]
    fn test_empty_task_rejected_by_ew() -> Result<()> {
        let registry = DriverRegistry::builtin();
        let transport = MemoryTransport::new();
        ew_acks(&transport, "COM1");
        let mut slot = bound_slot(&registry, "EW Logger", &transport, "COM1", Instant::now())?;
        assert!(slot.open());

        assert!(slot.declare_begin("Pilot", "Club", "X"));
        assert!(!slot.declare_end());
        assert_eq!(slot.declaration_phase(), DeclarationPhase::Failed);
        // The recorder was returned to normal operation.
        assert!(transport.written("COM1").contains("NoMsg\r\n"));
        Ok(())
    }

    #[test]
    fn test_ew_waypoint_limit() -> Result<()> {
        let registry = DriverRegistry::builtin();
        let transport = MemoryTransport::new();
        ew_acks(&transport, "COM1");
        let mut slot = bound_slot(&registry, "EW Logger", &transport, "COM1", Instant::now())?;
        assert!(slot.open());

        assert!(slot.declare_begin("Pilot", "Club", "X"));
        for i in 0..6 {
            assert!(slot.declare_add_waypoint(&waypoint(i, "WP")));
        }
        assert!(!slot.declare_add_waypoint(&waypoint(6, "WP")));
        assert_eq!(slot.declaration_phase(), DeclarationPhase::Failed);
        assert_eq!(slot.session().context("session")?.waypoints().len(), 6);
        Ok(())
    }

    #[test]
    fn test_add_waypoint_before_begin() -> Result<()> {
        let registry = DriverRegistry::builtin();
        let transport = MemoryTransport::new();
        cai302_prompts(&transport, "COM1");
        let mut slot = bound_slot(&registry, "CAI 302", &transport, "COM1", Instant::now())?;
        assert!(slot.open());

        assert!(!slot.declare_add_waypoint(&waypoint(1, "Start")));
        assert_eq!(slot.declaration_phase(), DeclarationPhase::Idle);
        assert!(!slot.declare_end());
        assert_eq!(slot.declaration_phase(), DeclarationPhase::Idle);
        assert_eq!(transport.written("COM1"), "");
        Ok(())
    }

    #[test]
    fn test_double_begin_rejected() -> Result<()> {
        let registry = DriverRegistry::builtin();
        let transport = MemoryTransport::new();
        cai302_prompts(&transport, "COM1");
        let mut slot = bound_slot(&registry, "CAI 302", &transport, "COM1", Instant::now())?;
        assert!(slot.open());

        assert!(slot.declare_begin("First", "Standard", "D-1"));
        let written = transport.written("COM1");

        assert!(!slot.declare_begin("Second", "Open", "D-2"));
        assert_eq!(slot.declaration_phase(), DeclarationPhase::Begun);
        assert_eq!(slot.session().context("session")?.pilot(), "First");
        assert_eq!(transport.written("COM1"), written);

        // Still usable after the rejected call.
        assert!(slot.declare_add_waypoint(&waypoint(1, "Start")));
        assert!(!slot.declare_begin("Second", "Open", "D-2"));
        assert_eq!(slot.declaration_phase(), DeclarationPhase::Adding);
        Ok(())
    }

    #[test]
    fn test_device_refusal_fails_session() -> Result<()> {
        let registry = DriverRegistry::builtin();
        let transport = MemoryTransport::new();
        cai302_prompts(&transport, "COM1");
        let mut slot = bound_slot(&registry, "CAI 302", &transport, "COM1", Instant::now())?;
        assert!(slot.open());

        assert!(slot.declare_begin("Pilot", "Club", "X"));
        transport.clear_responders("COM1");
        transport.respond("COM1", "D,", "Error: record refused");

        assert!(!slot.declare_add_waypoint(&waypoint(1, "Start")));
        assert_eq!(slot.declaration_phase(), DeclarationPhase::Failed);
        assert!(slot.session().context("session")?.waypoints().is_empty());

        // A failed session cannot be resumed
        assert!(!slot.declare_add_waypoint(&waypoint(2, "TP")));
        assert!(!slot.declare_end());

        // but a new one can be started.
        transport.clear_responders("COM1");
        cai302_prompts(&transport, "COM1");
        assert!(slot.declare_begin("Pilot", "Club", "X"));
        assert_eq!(slot.declaration_phase(), DeclarationPhase::Begun);
        Ok(())
    }

    #[test]
    fn test_silent_device_times_out() -> Result<()> {
        let registry = DriverRegistry::builtin();
        let transport = MemoryTransport::new();
        let mut slot = bound_slot(&registry, "EW Logger", &transport, "COM1", Instant::now())?;
        assert!(slot.open());

        assert!(!slot.declare_begin("Pilot", "Club", "X"));
        assert_eq!(slot.declaration_phase(), DeclarationPhase::Failed);
        Ok(())
    }

    #[test]
    fn test_non_logger_cannot_declare() -> Result<()> {
        let registry = DriverRegistry::builtin();
        let transport = MemoryTransport::new();
        for (name, port) in [("Generic", "COM1"), ("Vega", "COM2")] {
            let mut slot = bound_slot(&registry, name, &transport, port, Instant::now())?;
            assert!(slot.open());
            assert!(!slot.declare_begin("Pilot", "Club", "X"));
            assert_eq!(slot.declaration_phase(), DeclarationPhase::Idle);
            assert_eq!(transport.written(port), "");
        }
        Ok(())
    }

    #[test]
    fn test_declare_helper() -> Result<()> {
        let registry = DriverRegistry::builtin();
        let transport = MemoryTransport::new();
        ew_acks(&transport, "COM1");
        let mut slot = bound_slot(&registry, "EW Logger", &transport, "COM1", Instant::now())?;
        assert!(slot.open());

        let task = Declaration {
            pilot: "Pilot".to_string(),
            glider_class: "Club".to_string(),
            glider_id: "X".to_string(),
            waypoints: vec![waypoint(1, "Start"), waypoint(2, "Finish")],
        };
        assert!(slot.declare(&task));
        assert_eq!(slot.declaration_phase(), DeclarationPhase::Ended);
        assert!(transport.written("COM1").contains("#END02"));

        // Recycled for the next declaration.
        assert!(slot.declare(&task));
        Ok(())
    }

    #[test]
    fn test_abort_only_when_active() -> Result<()> {
        let registry = DriverRegistry::builtin();
        let transport = MemoryTransport::new();
        cai302_prompts(&transport, "COM1");
        let mut slot = bound_slot(&registry, "CAI 302", &transport, "COM1", Instant::now())?;
        assert!(slot.open());

        assert!(!slot.declare_abort());
        assert!(slot.declare_begin("Pilot", "Club", "X"));
        assert!(slot.declare_abort());
        assert_eq!(slot.declaration_phase(), DeclarationPhase::Failed);
        assert!(!slot.declare_abort());
        Ok(())
    }
}

#[cfg(test)]
mod manager_tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use crate::config::GlideConfig;
    use crate::connection::DeviceManager;
    use crate::declaration::DeclarationPhase;
    use crate::fix::NavFix;
    use crate::link::LinkStatus;
    use crate::port::MemoryTransport;
    use crate::registry::{Capabilities, DriverRegistry};
    use crate::slot::NUMDEV;
    use crate::state::PortLine;
    use anyhow::{Context, Result};
    use tokio::sync::mpsc;

    use super::helpers::*;

    fn manager(registry: DriverRegistry, transport: &MemoryTransport) -> DeviceManager {
        DeviceManager::new(
            registry,
            Arc::new(transport.clone()),
            LINK_WINDOW,
            Duration::from_millis(50),
        )
    }

    async fn assert_ports_unique(manager: &DeviceManager) {
        let infos = manager.slot_infos().await;
        let ports: Vec<&String> = infos.iter().filter_map(|i| i.port.as_ref()).collect();
        for (i, a) in ports.iter().enumerate() {
            for b in &ports[i + 1..] {
                assert_ne!(a, b, "two slots claim {a}");
            }
        }
    }

    #[tokio::test]
    async fn test_bind_resolve_unbind() -> Result<()> {
        let transport = MemoryTransport::new();
        let manager = manager(DriverRegistry::builtin(), &transport);

        for slot in 0..NUMDEV {
            let port = format!("COM{slot}");
            assert!(manager.bind(slot, &port, "Generic").await);
            assert_eq!(manager.resolve(&port).await, Some(slot));
        }
        for slot in 0..NUMDEV {
            let port = format!("COM{slot}");
            assert!(manager.unbind(slot).await);
            assert_eq!(manager.resolve(&port).await, None);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_bind_contract_violations() -> Result<()> {
        let transport = MemoryTransport::new();
        let manager = manager(DriverRegistry::builtin(), &transport);

        assert!(!manager.bind(NUMDEV, "COM1", "Generic").await);
        assert!(!manager.bind(0, "COM1", "No Such Driver").await);
        assert_eq!(manager.resolve("COM1").await, None);
        assert!(!manager.unbind(7).await);

        assert!(manager.bind(0, "COM1", "Generic").await);
        assert!(!manager.bind(1, "COM1", "Vega").await);
        assert_eq!(manager.resolve("COM1").await, Some(0));

        // Rebinding the owner to its own port is fine.
        assert!(manager.bind(0, "COM1", "Vega").await);
        let info = manager.slot_info(0).await.context("slot 0")?;
        assert_eq!(info.driver.as_deref(), Some("Vega"));
        assert!(manager.slot_info(5).await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_ports_stay_unique() -> Result<()> {
        let transport = MemoryTransport::new();
        let manager = manager(DriverRegistry::builtin(), &transport);

        let steps: [(usize, Option<&str>); 9] = [
            (0, Some("A")),
            (1, Some("A")),
            (1, Some("B")),
            (0, Some("B")),
            (0, None),
            (1, Some("A")),
            (0, Some("B")),
            (1, None),
            (0, Some("A")),
        ];
        for (slot, port) in steps {
            match port {
                Some(port) => {
                    manager.bind(slot, port, "Generic").await;
                }
                None => {
                    manager.unbind(slot).await;
                }
            }
            assert_ports_unique(&manager).await;
        }
        assert_eq!(manager.resolve("A").await, Some(0));
        assert_eq!(manager.resolve("B").await, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_generic_nmea_end_to_end() -> Result<()> {
        let mut registry = DriverRegistry::new();
        assert!(registry.register("GenericNMEA", Capabilities::GPS));

        let transport = MemoryTransport::new();
        let manager = manager(registry, &transport);
        assert!(manager.bind(0, "COM1", "GenericNMEA").await);
        assert!(manager.connect(0).await);

        let mut fix = NavFix::new();
        assert!(manager.parse_line(0, RMC, &mut fix).await);
        assert!(fix.has_position());
        assert!(!fix.has_vario());
        assert!(!fix.has_wind());

        assert!(!manager.put_mac_cready(0, 1.5).await);
        assert!(manager.is_gps_source(0).await);
        assert!(!manager.is_logger(0).await);
        assert_eq!(transport.written("COM1"), "");
        Ok(())
    }

    #[tokio::test]
    async fn test_handle_line_routing() -> Result<()> {
        let transport = MemoryTransport::new();
        let manager = manager(DriverRegistry::builtin(), &transport);
        assert!(manager.bind(0, "COM1", "Generic").await);
        assert!(manager.bind(1, "COM2", "Vega").await);

        let gps = manager.handle_line("COM1", RMC).await.context("no GPS fix")?;
        assert_eq!(gps.slot, 0);
        assert!(gps.fix.has_position());

        let vario = manager.handle_line("COM2", PDVDV).await.context("no vario fix")?;
        assert_eq!(vario.slot, 1);
        assert!(vario.fix.has_vario());

        assert!(manager.handle_line("COM1", PDVDV).await.is_none());
        assert!(manager.handle_line("COM3", RMC).await.is_none());

        assert!(manager.unbind(0).await);
        assert!(manager.handle_line("COM1", RMC).await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_rebind_fails_active_declaration() -> Result<()> {
        let transport = MemoryTransport::new();
        cai302_prompts(&transport, "COM1");
        let manager = manager(DriverRegistry::builtin(), &transport);
        assert!(manager.bind(0, "COM1", "CAI 302").await);
        assert!(manager.open(0).await);

        assert!(manager.declare_begin(0, "Pilot", "Club", "X").await);
        assert!(manager.declare_add_waypoint(0, &waypoint(1, "Start")).await);
        assert_eq!(
            manager.declaration_phase(0).await,
            Some(DeclarationPhase::Adding)
        );

        assert!(manager.bind(0, "COM1", "CAI 302").await);
        assert_eq!(
            manager.declaration_phase(0).await,
            Some(DeclarationPhase::Failed)
        );
        assert!(!transport.is_open("COM1"));

        assert!(manager.open(0).await);
        assert!(manager.declare_begin(0, "Pilot", "Club", "X").await);
        assert_eq!(
            manager.declaration_phase(0).await,
            Some(DeclarationPhase::Begun)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_unbind_fails_active_declaration() -> Result<()> {
        let transport = MemoryTransport::new();
        ew_acks(&transport, "COM1");
        let manager = manager(DriverRegistry::builtin(), &transport);
        assert!(manager.bind(0, "COM1", "EW Logger").await);
        assert!(manager.open(0).await);
        assert!(manager.declare_begin(0, "Pilot", "Club", "X").await);

        assert!(manager.unbind(0).await);
        assert_eq!(
            manager.declaration_phase(0).await,
            Some(DeclarationPhase::Failed)
        );
        assert!(transport.written("COM1").contains("NoMsg"));
        assert!(!manager.declare_add_waypoint(0, &waypoint(1, "Start")).await);
        Ok(())
    }

    #[tokio::test]
    async fn test_link_check_through_manager() -> Result<()> {
        let transport = MemoryTransport::new();
        let manager = manager(DriverRegistry::builtin(), &transport);
        assert_eq!(manager.check_link(0, Instant::now()).await, None);

        assert!(manager.bind(0, "COM1", "Generic").await);
        transport.set_fail_open("COM1", true);
        let later = Instant::now() + LINK_WINDOW;
        assert_eq!(
            manager.check_link(0, later).await,
            Some(LinkStatus::TimedOut)
        );
        assert!(!manager.link_timeout_notify(0).await);

        let fix = manager.handle_line("COM1", GGA).await;
        assert!(fix.is_some());
        let info = manager.slot_info(0).await.context("slot 0")?;
        assert_eq!(info.link, LinkStatus::Live);
        assert_eq!(info.timeouts, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_ingest_pipeline() -> Result<()> {
        let transport = MemoryTransport::new();
        let manager = Arc::new(manager(DriverRegistry::builtin(), &transport));
        assert!(manager.bind(0, "COM1", "Generic").await);

        let (line_tx, line_rx) = mpsc::channel(16);
        let (fix_tx, mut fix_rx) = mpsc::channel(16);
        let handle = manager.spawn_ingest(line_rx, fix_tx);

        for line in ["garbage", RMC, "$GPRMC,1", GGA] {
            line_tx.send(PortLine::new("COM1", line)).await?;
        }
        line_tx.send(PortLine::new("COM2", RMC)).await?;
        drop(line_tx);

        let first = fix_rx.recv().await.context("first fix")?;
        let second = fix_rx.recv().await.context("second fix")?;
        assert_eq!(first.slot, 0);
        assert!(first.fix.ground_speed.is_some());
        assert_eq!(second.fix.satellites, Some(8));
        assert!(fix_rx.recv().await.is_none());

        handle.await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_from_config() -> Result<()> {
        let mut config = GlideConfig::default();
        config.set_value("slot0.port", "COM1")?;
        config.set_value("slot0.driver", "CAI 302")?;
        config.set_value("slot1.port", "COM2")?;
        config.set_value("link.timeout", "30s")?;

        let transport = MemoryTransport::new();
        let manager = DeviceManager::from_config(
            &config,
            DriverRegistry::builtin(),
            Arc::new(transport.clone()),
        )
        .await?;
        assert_eq!(manager.resolve("COM1").await, Some(0));
        // Slot 1 has no driver configured.
        assert_eq!(manager.resolve("COM2").await, None);
        assert_eq!(manager.link_timeout(), Duration::from_secs(30));

        config.set_value("slot1.driver", "Unknown")?;
        let result = DeviceManager::from_config(
            &config,
            DriverRegistry::builtin(),
            Arc::new(transport.clone()),
        )
        .await;
        assert!(result.is_err());
        Ok(())
    }
}

#[cfg(test)]
mod config_tests {
    use std::time::Duration;

    use crate::config::GlideConfig;
    use anyhow::Result;
    use serde_json::json;

    #[test]
    fn test_defaults() -> Result<()> {
        let config: GlideConfig = serde_json::from_str("{}")?;
        assert_eq!(config, GlideConfig::default());
        assert_eq!(config.link.timeout, Duration::from_secs(20));
        assert_eq!(config.slots[0].baud_rate, 4800);
        assert!(config.slots[1].port.is_none());
        Ok(())
    }

    #[test]
    fn test_get_and_set() -> Result<()> {
        let mut config = GlideConfig::default();
        config.set_value("slot1.port", "/dev/ttyUSB0")?;
        config.set_value("slot1.baud_rate", "38400")?;
        config.set_value("link.io_timeout", "500ms")?;

        assert_eq!(
            config.get_value("slot1.port")?,
            json!({"key": "slot1.port", "value": "/dev/ttyUSB0"})
        );
        assert_eq!(config.get_value("slot1.baud_rate")?["value"], json!(38400));
        assert_eq!(config.get_value("link.io_timeout")?["value"], json!("500ms"));

        config.set_value("slot1.port", "")?;
        assert!(config.slots[1].port.is_none());
        Ok(())
    }

    #[test]
    fn test_invalid_keys() -> Result<()> {
        let mut config = GlideConfig::default();
        assert!(config.get_value("timeout").is_err());
        assert!(config.get_value("slot2.port").is_err());
        assert!(config.get_value("slotx.port").is_err());
        assert!(config.get_value("display.units").is_err());
        assert!(config.set_value("slot0.colour", "red").is_err());
        assert!(config.set_value("link.timeout", "soon").is_err());
        assert!(config.set_value("link.timeout", "0s").is_err());
        assert!(config.set_value("slot0.baud_rate", "fast").is_err());
        assert_eq!(config, GlideConfig::default());
        Ok(())
    }

    #[test]
    fn test_json_format() -> Result<()> {
        let text = r#"{
            "slots": [
                {"port": "COM1", "driver": "Vega", "baud_rate": 19200},
                {}
            ],
            "link": {"timeout": "1m 30s", "io_timeout": "2s"}
        }"#;
        let config: GlideConfig = serde_json::from_str(text)?;
        assert_eq!(config.slots[0].driver.as_deref(), Some("Vega"));
        assert_eq!(config.link.timeout, Duration::from_secs(90));

        let encoded = serde_json::to_value(&config)?;
        assert_eq!(encoded["link"]["timeout"], json!("1m 30s"));
        assert!(encoded["slots"][1].get("port").is_none());
        Ok(())
    }

    #[test]
    fn test_file_round_trip() -> Result<()> {
        let path = std::env::temp_dir().join(format!(
            "glidelink-config-{pid}.json",
            pid = std::process::id()
        ));
        let mut config = GlideConfig::default();
        config.set_value("slot0.driver", "EW Logger")?;
        config.save(&path)?;

        let loaded = GlideConfig::load_or_default(&path)?;
        std::fs::remove_file(&path)?;
        assert_eq!(loaded, config);

        let missing = GlideConfig::load_or_default(&path)?;
        assert_eq!(missing, GlideConfig::default());
        Ok(())
    }
}
