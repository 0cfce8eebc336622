//! Core application runner (business logic) for `gripscan`.
//!
//! This module is intentionally decoupled from CLI parsing and process exit
//! codes so it can be tested deterministically with an injected scanner and
//! injected output streams.

use crate::classify::Classifier;
use crate::output::Presenter;
use crate::output::text::TextPresenter;
use crate::scanner::{Backend, EventResult, ScanError};
use crate::session::{ScanSession, SessionError};
use clap::Parser;
use std::future::Future;
use std::io;
use std::io::Write;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Configuration for the core run loop.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Keyword matched case-insensitively against advertised device names.
    /// Repeatable; defaults to the built-in grip-device keyword set.
    #[arg(long = "keyword", value_name = "KEYWORD")]
    pub keywords: Vec<String>,

    /// Stop scanning after this long.
    /// Accepts duration with suffix: 30s, 1m, 500ms, 2h.
    /// Without suffix, value is interpreted as seconds.
    /// Scans until interrupted when omitted.
    #[arg(long, value_parser = crate::duration::parse_duration)]
    pub duration: Option<Duration>,

    /// Verbose output, print per-event Bluetooth errors
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Probe Bluetooth adapter and permission state, then exit
    #[arg(long)]
    pub permissions: bool,

    /// Re-render the full device list after every advertisement instead of
    /// printing one line per sighting
    #[arg(long)]
    pub live: bool,

    /// Bluetooth scanner backend to use
    #[arg(long, default_value_t, value_enum)]
    pub backend: Backend,
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Scanner abstraction to enable deterministic unit tests without Bluetooth hardware.
pub trait Scanner: Send + Sync {
    fn start_scan(
        &self,
        backend: Backend,
        verbose: bool,
    ) -> Pin<Box<dyn Future<Output = Result<mpsc::Receiver<EventResult>, ScanError>> + Send + '_>>;
}

/// Real scanner implementation that delegates to the compiled-in backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealScanner;

impl Scanner for RealScanner {
    fn start_scan(
        &self,
        backend: Backend,
        verbose: bool,
    ) -> Pin<Box<dyn Future<Output = Result<mpsc::Receiver<EventResult>, ScanError>> + Send + '_>>
    {
        Box::pin(async move { crate::scanner::start_scan(backend, verbose).await })
    }
}

/// Run the scan session, writing rendered output to `out` and verbose
/// diagnostics to `err`.
///
/// Control flow mirrors the session state machine: begin (clears the
/// registry), start the scanner (failure reverts the session), observe
/// events until the channel closes or `--duration` elapses, then finish and
/// render the final sorted listing plus a summary line.
pub async fn run_with_io(
    options: Options,
    scanner: &dyn Scanner,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<(), RunError> {
    let classifier = Classifier::new(&options.keywords);
    let presenter = TextPresenter::new();
    let mut session = ScanSession::new();

    session.begin()?;
    let mut events = match scanner.start_scan(options.backend, options.verbose).await {
        Ok(events) => events,
        Err(error) => {
            session.abort();
            return Err(error.into());
        }
    };
    writeln!(out, "scanning...")?;

    let deadline = options.duration.map(|d| tokio::time::Instant::now() + d);

    loop {
        let next = match deadline {
            Some(at) => match tokio::time::timeout_at(at, events.recv()).await {
                Ok(next) => next,
                Err(_) => break, // requested scan duration elapsed
            },
            None => events.recv().await,
        };
        let Some(result) = next else { break };

        match result {
            Ok(event) => {
                let Some(observation) = session.observe(&event, &classifier) else {
                    continue;
                };

                if let Some(kilograms) = observation.grip {
                    writeln!(out, "{}", presenter.grip_highlight(kilograms))?;
                }

                if options.live {
                    let listing = session.registry().sorted_by_signal();
                    writeln!(out, "{}", presenter.device_list(&listing))?;
                } else {
                    writeln!(out, "{}", presenter.device_line(&observation))?;
                }
            }
            Err(event_error) => {
                if options.verbose {
                    writeln!(err, "{event_error}")?;
                }
            }
        }
    }

    // Dropping the receiver asks the backend to cease scanning.
    drop(events);

    let device_count = session.finish().unwrap_or(0);
    let listing = session.registry().sorted_by_signal();
    writeln!(out, "{}", presenter.device_list(&listing))?;
    writeln!(out, "{}", presenter.summary(device_count))?;

    Ok(())
}

/// Entry point used by the binary: real scanner, stdout/stderr.
pub async fn run(options: Options) -> Result<(), RunError> {
    if options.permissions {
        let status = crate::scanner::check_permissions(options.backend).await?;
        let presenter = TextPresenter::new();
        writeln!(io::stdout().lock(), "{}", presenter.permission_status(&status))?;
        return Ok(());
    }

    let scanner = RealScanner;
    let mut out = io::stdout().lock();
    let mut err = io::stderr().lock();
    run_with_io(options, &scanner, &mut out, &mut err).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac_address::MacAddress;
    use crate::scanner::EventError;
    use crate::test_utils::{TEST_MAC, advert_event, grip_event};
    use std::sync::Mutex;

    #[derive(Debug)]
    struct FakeScanner {
        results: Mutex<Vec<EventResult>>,
    }

    impl FakeScanner {
        fn new(results: Vec<EventResult>) -> Self {
            Self {
                results: Mutex::new(results),
            }
        }
    }

    impl Scanner for FakeScanner {
        fn start_scan(
            &self,
            _backend: Backend,
            _verbose: bool,
        ) -> Pin<
            Box<dyn Future<Output = Result<mpsc::Receiver<EventResult>, ScanError>> + Send + '_>,
        > {
            let results = self.results.lock().unwrap().clone();
            Box::pin(async move {
                let (tx, rx) = mpsc::channel::<EventResult>(results.len().max(1));
                tokio::spawn(async move {
                    for r in results {
                        let _ = tx.send(r).await;
                    }
                    // drop tx to close channel
                });
                Ok(rx)
            })
        }
    }

    /// A scanner whose start request is always rejected.
    struct FailingScanner;

    impl Scanner for FailingScanner {
        fn start_scan(
            &self,
            _backend: Backend,
            _verbose: bool,
        ) -> Pin<
            Box<dyn Future<Output = Result<mpsc::Receiver<EventResult>, ScanError>> + Send + '_>,
        > {
            Box::pin(async { Err(ScanError::StartFailed("adapter unavailable".to_string())) })
        }
    }

    fn options() -> Options {
        Options {
            keywords: vec![],
            duration: None,
            verbose: false,
            permissions: false,
            live: false,
            backend: Backend::Bluer,
        }
    }

    async fn run_to_strings(options: Options, scanner: &dyn Scanner) -> (String, String) {
        let mut out = Vec::<u8>::new();
        let mut err = Vec::<u8>::new();
        run_with_io(options, scanner, &mut out, &mut err)
            .await
            .unwrap();
        (
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[tokio::test]
    async fn run_renders_target_device_and_grip() {
        // 0x012C = 300 -> 30.0 kg
        let event = grip_event(TEST_MAC, "Grip Dynamometer", -42, &[0x00, 0x00, 0x01, 0x2C]);
        let scanner = FakeScanner::new(vec![Ok(event)]);

        let (out, err) = run_to_strings(options(), &scanner).await;

        assert!(err.is_empty());
        assert!(out.contains(">>> grip 30.0 kg"));
        assert!(out.contains("Grip Dynamometer *"));
        assert!(out.contains("mac=AA:BB:CC:DD:EE:FF"));
        assert!(out.contains("scan stopped (1 devices seen)"));
    }

    #[tokio::test]
    async fn run_counts_unique_devices_only() {
        let scanner = FakeScanner::new(vec![
            Ok(advert_event(TEST_MAC, Some("Mi Band"), -80)),
            Ok(advert_event(TEST_MAC, Some("Mi Band"), -44)),
            Ok(advert_event(MacAddress([1; 6]), None, -60)),
        ]);

        let (out, _) = run_to_strings(options(), &scanner).await;

        assert!(out.contains("2 devices, strongest signal first:"));
        assert!(out.contains("scan stopped (2 devices seen)"));
        // The replacement observation wins the listing
        assert!(out.contains("rssi=-44 dBm"));
    }

    #[tokio::test]
    async fn run_sorts_final_listing_by_signal() {
        let scanner = FakeScanner::new(vec![
            Ok(advert_event(MacAddress([1; 6]), Some("far"), -80)),
            Ok(advert_event(MacAddress([2; 6]), Some("near"), -40)),
            Ok(advert_event(MacAddress([3; 6]), Some("mid"), -60)),
        ]);

        let (out, _) = run_to_strings(options(), &scanner).await;

        let listing = out.split("3 devices").nth(1).unwrap();
        let near = listing.find("near").unwrap();
        let mid = listing.find("mid").unwrap();
        let far = listing.find("far").unwrap();
        assert!(near < mid && mid < far);
    }

    #[tokio::test]
    async fn run_live_mode_rerenders_listing() {
        let scanner = FakeScanner::new(vec![Ok(advert_event(TEST_MAC, Some("Mi Band"), -50))]);

        let mut live = options();
        live.live = true;
        let (out, _) = run_to_strings(live, &scanner).await;

        // Once per event, once at shutdown
        assert_eq!(out.matches("1 devices, strongest signal first:").count(), 2);
    }

    #[tokio::test]
    async fn run_prints_event_errors_only_when_verbose() {
        let make_scanner = || {
            FakeScanner::new(vec![Err(EventError::Bluetooth(
                "device vanished".to_string(),
            ))])
        };

        let (out, err) = run_to_strings(options(), &make_scanner()).await;
        assert!(!out.contains("device vanished"));
        assert!(err.is_empty());

        let mut verbose = options();
        verbose.verbose = true;
        let (_, err) = run_to_strings(verbose, &make_scanner()).await;
        assert!(err.contains("Bluetooth error: device vanished"));
    }

    #[tokio::test]
    async fn run_custom_keywords_override_defaults() {
        let scanner = FakeScanner::new(vec![Ok(grip_event(
            TEST_MAC,
            "Squeezy-01",
            -50,
            &[0x00, 0x00, 0x00, 0x64],
        ))]);

        let mut custom = options();
        custom.keywords = vec!["squeezy".to_string()];
        let (out, _) = run_to_strings(custom, &scanner).await;

        assert!(out.contains("Squeezy-01 *"));
        assert!(out.contains(">>> grip 10.0 kg"));
    }

    #[tokio::test]
    async fn run_start_failure_is_surfaced() {
        let mut out = Vec::<u8>::new();
        let mut err = Vec::<u8>::new();
        let result = run_with_io(options(), &FailingScanner, &mut out, &mut err).await;

        assert!(matches!(
            result,
            Err(RunError::Scan(ScanError::StartFailed(_)))
        ));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn run_duration_bounds_the_scan() {
        // Channel stays open; only the deadline can end the loop.
        let (tx, rx) = mpsc::channel::<EventResult>(1);

        struct HeldScanner(Mutex<Option<mpsc::Receiver<EventResult>>>);
        impl Scanner for HeldScanner {
            fn start_scan(
                &self,
                _backend: Backend,
                _verbose: bool,
            ) -> Pin<
                Box<
                    dyn Future<Output = Result<mpsc::Receiver<EventResult>, ScanError>>
                        + Send
                        + '_,
                >,
            > {
                let rx = self.0.lock().unwrap().take().unwrap();
                Box::pin(async move { Ok(rx) })
            }
        }

        let scanner = HeldScanner(Mutex::new(Some(rx)));
        let mut bounded = options();
        bounded.duration = Some(Duration::from_millis(20));

        let (out, _) = run_to_strings(bounded, &scanner).await;
        drop(tx);

        assert!(out.contains("scan stopped (0 devices seen)"));
        assert!(out.contains("no devices found"));
    }
}
