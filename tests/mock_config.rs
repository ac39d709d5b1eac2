use std::io::Write;
use std::path::Path;

use modbus_link::transport::Framing;
use modbus_link_mock::config::ListenerKind;
use modbus_link_mock::{MockConfig, MockServer};

#[test]
fn sample_define_file_loads() -> anyhow::Result<()> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("define/mock_slaves.toml");
    let cfg = MockConfig::load(&path)?;
    assert_eq!(cfg.listener.kind, ListenerKind::Tcp);
    assert_eq!(cfg.listener.keepalive_secs, Some(30));

    let server = MockServer::from_config(&cfg)?;
    assert_eq!(server.framing(), Framing::Ip);
    assert_eq!(server.registry().unit_ids(), vec![1, 2, 17]);

    let snapshot = server.snapshot()?;
    assert_eq!(snapshot[0].holding_registers.len(), 4);
    assert_eq!(snapshot[0].input_registers.get(&1), Some(&0x5678));
    assert_eq!(snapshot[1].inputs.keys().copied().collect::<Vec<_>>(), vec![8, 9]);
    assert!(snapshot[2].coils.is_empty());
    Ok(())
}

#[test]
fn config_from_tempfile() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "[listener]\nkind = \"udp\"\nframing = \"ascii\"\n\n[[slaves]]\nunit_id = 9")?;
    let cfg = MockConfig::load(file.path())?;
    let server = MockServer::from_config(&cfg)?;
    assert_eq!(cfg.listener.kind, ListenerKind::Udp);
    assert_eq!(server.framing(), Framing::Ascii);
    assert_eq!(server.registry().unit_ids(), vec![9]);
    Ok(())
}

#[test]
fn missing_file_reports_path() {
    let err = MockConfig::load(Path::new("/nonexistent/mock.toml")).unwrap_err();
    assert!(format!("{err:#}").contains("/nonexistent/mock.toml"));
}
