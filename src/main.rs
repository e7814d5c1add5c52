use std::path::PathBuf;

use tracing::{info, warn};
use uuid::Uuid;

use facility_scout::browser::native_browser_available;
use facility_scout::reconcile::Reconciler;
use facility_scout::traverse::{harvest_targets, run_target, BrowserPolicy, CancelHandle, HarvestTarget};
use facility_scout::{
    load_config, FileSink, PersistenceSink, RegionClassifier, RunSummary, ValidatedRecord,
};

#[derive(Debug, Default)]
struct CliOptions {
    urls: Vec<String>,
    pages: Option<u32>,
    out_dir: Option<String>,
    precision: Option<u32>,
    seeds: Option<String>,
    no_browser: bool,
    concurrency: Option<usize>,
    help: bool,
}

fn usage() -> &'static str {
    "facility-scout — harvest facility listings from a JS-rendered directory

USAGE:
    facility-scout [OPTIONS] <URL>...

OPTIONS:
    --pages <N>        Override the page count instead of discovering it
    --out <DIR>        Output directory (default: data)
    --precision <N>    Coordinate rounding digits for deduplication (default: 4)
    --seeds <FILE>     JSON file of curated records merged into the run
    --no-browser       Skip the simulated-interaction mechanism
    --concurrency <N>  Worker-pool width for multiple URLs (default: 4)
    --help             Show this message

Further tuning lives in facility-scout.json (see HarvestConfig)."
}

fn parse_args(args: &[String]) -> Result<CliOptions, String> {
    let mut opts = CliOptions::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        let mut take_value = |flag: &str| -> Result<String, String> {
            if let Some(rest) = arg.strip_prefix(&format!("{}=", flag)) {
                return Ok(rest.to_string());
            }
            iter.next()
                .cloned()
                .ok_or_else(|| format!("{} expects a value", flag))
        };

        match arg.as_str() {
            "--help" | "-h" => opts.help = true,
            "--no-browser" => opts.no_browser = true,
            a if a == "--pages" || a.starts_with("--pages=") => {
                let value = take_value("--pages")?;
                opts.pages =
                    Some(value.parse().map_err(|_| format!("bad --pages value: {}", value))?);
            }
            a if a == "--out" || a.starts_with("--out=") => {
                opts.out_dir = Some(take_value("--out")?);
            }
            a if a == "--precision" || a.starts_with("--precision=") => {
                let value = take_value("--precision")?;
                opts.precision =
                    Some(value.parse().map_err(|_| format!("bad --precision value: {}", value))?);
            }
            a if a == "--seeds" || a.starts_with("--seeds=") => {
                opts.seeds = Some(take_value("--seeds")?);
            }
            a if a == "--concurrency" || a.starts_with("--concurrency=") => {
                let value = take_value("--concurrency")?;
                opts.concurrency = Some(
                    value
                        .parse()
                        .map_err(|_| format!("bad --concurrency value: {}", value))?,
                );
            }
            a if a == "--url" || a.starts_with("--url=") => {
                opts.urls.push(take_value("--url")?);
            }
            a if a.starts_with("--") => return Err(format!("unknown flag: {}", a)),
            other => opts.urls.push(other.to_string()),
        }
    }

    Ok(opts)
}

fn target_label(url: &str, index: usize) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last().map(String::from))
        })
        .unwrap_or_else(|| format!("target-{}", index + 1))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let opts = match parse_args(&args) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("{}\n\n{}", e, usage());
            std::process::exit(2);
        }
    };
    if opts.help || opts.urls.is_empty() {
        println!("{}", usage());
        return Ok(());
    }

    let mut cfg = load_config();
    if opts.precision.is_some() {
        cfg.precision = opts.precision;
    }
    if opts.out_dir.is_some() {
        cfg.output_dir = opts.out_dir.clone();
    }
    if opts.concurrency.is_some() {
        cfg.max_concurrent_targets = opts.concurrency;
    }
    if opts.seeds.is_some() {
        cfg.seed_path = opts.seeds.clone();
    }

    let run_id = Uuid::new_v4();
    info!("run {} starting: {} target(s)", run_id, opts.urls.len());

    // Ctrl-C stops the traversal between pages; whatever has been reconciled
    // by then is still written out.
    let cancel = CancelHandle::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("⏹️  interrupt received, stopping after the current page");
                cancel.cancel();
            }
        });
    }

    let targets: Vec<HarvestTarget> = opts
        .urls
        .iter()
        .enumerate()
        .map(|(index, url)| HarvestTarget {
            url: url.clone(),
            label: target_label(url, index),
        })
        .collect();

    let harvested = if targets.len() == 1 {
        // Single target: a browser that should exist but cannot launch is a
        // fatal engine-initialization error, surfaced before any page work.
        let policy = if opts.no_browser {
            BrowserPolicy::Disabled
        } else if native_browser_available() {
            BrowserPolicy::Required
        } else {
            warn!("no browser executable found; simulated interaction disabled");
            BrowserPolicy::Disabled
        };
        let outcome = run_target(&targets[0], &cfg, cancel.clone(), policy, opts.pages).await?;
        outcome.report.records
    } else {
        let (records, outcomes) = harvest_targets(
            targets,
            &cfg,
            cancel.clone(),
            !opts.no_browser,
            opts.pages,
        )
        .await;
        for outcome in &outcomes {
            info!(
                "{}: {} facilities, {} pages ({:?})",
                outcome.label,
                outcome.report.records.len(),
                outcome.report.pages_fetched,
                outcome.report.termination
            );
        }
        records
    };

    // Seeds go through the same classification and reconciliation as
    // scraped data; scraped records keep naming priority.
    let records = match cfg.seed_path.as_deref() {
        Some(path) => {
            let classifier = RegionClassifier::new(cfg.region.clone());
            let mut master = Reconciler::new(cfg.resolve_precision());
            for record in &harvested {
                master.absorb(record);
            }
            match facility_scout::seeds::load_seeds(&PathBuf::from(path)) {
                Ok(seeds) => {
                    let mut kept = 0usize;
                    for candidate in seeds {
                        let verdict = classifier.classify(candidate.latitude, candidate.longitude);
                        if !verdict.admissible {
                            continue;
                        }
                        kept += 1;
                        master.add(ValidatedRecord {
                            candidate,
                            region: verdict.region,
                            admissible: true,
                        });
                    }
                    info!("merged {} admissible seed records", kept);
                }
                Err(e) => warn!("seed file skipped: {}", e),
            }
            master.finalize()
        }
        None => harvested,
    };

    let summary = RunSummary::from_records(&records);
    info!("run {} finished:\n{}", run_id, summary);

    let sink = FileSink::new(cfg.resolve_output_dir());
    let paths = sink.write(&records)?;
    println!("{}", summary);
    println!("csv:    {}", paths.csv.display());
    println!("json:   {}", paths.json.display());
    println!("report: {}", paths.report.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn positional_and_flag_urls_both_collect() {
        let opts = parse_args(&args(&[
            "https://directory.example/a",
            "--url",
            "https://directory.example/b",
        ]))
        .unwrap();
        assert_eq!(opts.urls.len(), 2);
    }

    #[test]
    fn equals_and_space_forms_are_equivalent() {
        let a = parse_args(&args(&["--pages=5", "u"])).unwrap();
        let b = parse_args(&args(&["--pages", "5", "u"])).unwrap();
        assert_eq!(a.pages, Some(5));
        assert_eq!(b.pages, Some(5));
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert!(parse_args(&args(&["--frobnicate"])).is_err());
    }

    #[test]
    fn labels_come_from_the_last_path_segment() {
        assert_eq!(
            target_label("https://directory.example/locations/china/shanghai", 0),
            "shanghai"
        );
        assert_eq!(target_label("not a url", 3), "target-4");
    }
}
