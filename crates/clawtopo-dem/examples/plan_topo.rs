//! Example: Show the download plan for a domain without fetching anything.
//!
//! Usage: cargo run --example plan_topo -- <domain.yaml> [case_dir]
//!
//! The case directory defaults to the directory holding the domain file,
//! as with `clawtopo resolve`.

use clawtopo_dem::{default_case_dir, resolve, DataSource, DomainConfig, ExportQuery};
use std::env;
use std::path::{Path, PathBuf};

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <domain.yaml> [case_dir]", args[0]);
        eprintln!("Example: {} ./case/domain.yaml", args[0]);
        std::process::exit(1);
    }

    let domain_file = Path::new(&args[1]);
    let domain = DomainConfig::from_yaml_file(domain_file).expect("Invalid domain file");
    let case_dir = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| default_case_dir(domain_file));

    let plan = resolve(&domain, &case_dir).expect("Domain cannot be resolved");
    let query = ExportQuery::new(&plan.extent, plan.resolution, DataSource::NationalElevation)
        .expect("Extent cannot be snapped");

    println!("Cache file:  {}", plan.cache_path.display());
    println!("Raster file: {}", plan.raster_path().display());
    println!("Resolution:  {} m", plan.resolution);
    println!("Extent:      {}", query.extent);
    println!("Raster size: {} x {}", query.size.width, query.size.height);
    println!(
        "Cached:      {}",
        if plan.cache_path.is_file() { "yes" } else { "no" }
    );
}
