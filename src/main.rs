use anyhow::Result;

use loanlens::charts::{ChartSource, DataBackedCharts, PlaceholderCharts};
use loanlens::data;
use loanlens::logging::{log, obj, v_bool, v_str, v_u64, Domain, Level};
use loanlens::server::{self, AppContext};
use loanlens::state::Config;

fn main() -> Result<()> {
    let config = Config::from_env();

    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("data_dir", v_str(&config.data_dir)),
            ("bind_addr", v_str(&config.bind_addr)),
            ("row_cap", v_u64(config.row_cap as u64)),
            ("placeholder_mode", v_bool(config.placeholder_mode)),
        ]),
    );

    // Tables load exactly once, before the listener opens. Load failures
    // are absorbed inside data::load; the page then serves empty charts.
    let source: Box<dyn ChartSource> = if config.placeholder_mode {
        Box::new(PlaceholderCharts)
    } else {
        let tables = data::load(&config);
        for manifest in &tables.manifests {
            log(
                Level::Info,
                Domain::Data,
                "manifest",
                obj(&[
                    ("path", v_str(&manifest.path)),
                    ("sha256", v_str(&manifest.hash_sha256)),
                    ("rows", v_u64(manifest.row_count)),
                    ("bad_rows", v_u64(manifest.bad_rows)),
                ]),
            );
        }
        Box::new(DataBackedCharts::new(tables, config.sample_cap))
    };

    log(
        Level::Info,
        Domain::System,
        "ready",
        obj(&[("has_data", v_bool(source.has_data()))]),
    );

    server::run(&AppContext { config, source })
}
