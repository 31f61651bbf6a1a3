//! Dashboard HTTP server.
//!
//! Synchronous accept loop over a plain `TcpListener`: one page route,
//! everything else 404. Each request recomputes all six chart payloads
//! from the in-memory tables; there is no cache and no per-request state.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};

use anyhow::{Context, Result};

use crate::charts::{ChartSet, ChartSource};
use crate::logging::{log, obj, v_bool, v_str, v_u64, Domain, Level};
use crate::state::Config;

/// Everything the handler needs, built once at startup and passed in.
pub struct AppContext {
    pub config: Config,
    pub source: Box<dyn ChartSource>,
}

pub fn run(ctx: &AppContext) -> Result<()> {
    let listener = TcpListener::bind(&ctx.config.bind_addr)
        .with_context(|| format!("binding {}", ctx.config.bind_addr))?;

    log(
        Level::Info,
        Domain::Http,
        "listen",
        obj(&[
            ("addr", v_str(&ctx.config.bind_addr)),
            ("has_data", v_bool(ctx.source.has_data())),
        ]),
    );

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => handle_connection(stream, ctx),
            Err(err) => log(
                Level::Warn,
                Domain::Http,
                "accept.failed",
                obj(&[("error", v_str(&err.to_string()))]),
            ),
        }
    }

    Ok(())
}

fn handle_connection(mut stream: TcpStream, ctx: &AppContext) {
    let request_line = {
        let buf_reader = BufReader::new(&stream);
        match buf_reader.lines().next() {
            Some(Ok(line)) => line,
            _ => return,
        }
    };

    let (status, content_type, body) = handle_request(&request_line, ctx);

    log(
        Level::Info,
        Domain::Http,
        "request",
        obj(&[
            ("line", v_str(&request_line)),
            ("status", v_u64(status as u64)),
        ]),
    );

    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        status_text(status),
        content_type,
        body.len(),
        body
    );

    if let Err(err) = stream.write_all(response.as_bytes()) {
        log(
            Level::Warn,
            Domain::Http,
            "write.failed",
            obj(&[("error", v_str(&err.to_string()))]),
        );
    }
}

/// Route a request line to a response. Factored out of the socket loop so
/// tests can exercise routing and rendering without opening ports. Every
/// page request succeeds with 200, even with zero data loaded.
pub fn handle_request(request_line: &str, ctx: &AppContext) -> (u16, &'static str, String) {
    if request_line.starts_with("GET / ") || request_line == "GET /" {
        let status = ctx.source.has_data();
        let charts = ctx.source.build();
        (200, "text/html", render_page(status, &charts))
    } else {
        (404, "text/plain", "Not Found".to_string())
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        _ => "Unknown",
    }
}

/// Render the single dashboard page with the status flag and all six chart
/// payloads embedded as Plotly figure JSON.
pub fn render_page(has_data: bool, charts: &ChartSet) -> String {
    // "</" would terminate the script block early if a label carried it.
    let graphs_json = charts.to_value().to_string().replace("</", "<\\/");

    let (badge_class, badge_text) = if has_data {
        ("ok", "data loaded")
    } else {
        ("empty", "no data")
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>LoanLens - Portfolio Dashboard</title>
<script src="https://cdn.plot.ly/plotly-2.35.2.min.js"></script>
<style>
  :root {{
    --bg: #0f1419; --panel: #171d26; --border: #242d3a;
    --fg: #e6edf3; --muted: #7d8590;
    --ok: #00b894; --warn: #d63031;
  }}
  * {{ box-sizing: border-box; margin: 0; padding: 0; }}
  body {{ background: var(--bg); color: var(--fg);
         font-family: -apple-system, 'Segoe UI', sans-serif; }}
  header {{ display: flex; align-items: center; gap: 0.75rem;
            padding: 1rem 1.5rem; border-bottom: 1px solid var(--border); }}
  header h1 {{ font-size: 1.1rem; }}
  .badge {{ font-size: 0.75rem; padding: 0.2rem 0.6rem; border-radius: 999px;
            text-transform: uppercase; letter-spacing: 0.05em; }}
  .badge.ok {{ background: rgba(0,184,148,0.15); color: var(--ok); }}
  .badge.empty {{ background: rgba(214,48,49,0.15); color: var(--warn); }}
  main {{ max-width: 1400px; margin: 0 auto; padding: 1.5rem;
          display: grid; grid-template-columns: repeat(2, 1fr); gap: 1rem; }}
  .card {{ background: var(--panel); border: 1px solid var(--border);
           border-radius: 8px; padding: 0.75rem; min-height: 370px; }}
  .card.wide {{ grid-column: span 2; }}
  .nodata {{ display: flex; align-items: center; justify-content: center;
             height: 350px; color: var(--muted); font-size: 0.85rem; }}
  @media (max-width: 900px) {{
    main {{ grid-template-columns: 1fr; }}
    .card.wide {{ grid-column: span 1; }}
  }}
</style>
</head>
<body>
<header>
  <h1>LoanLens</h1>
  <span class="badge {badge_class}">{badge_text}</span>
</header>
<main>
  <div class="card" id="risk_dist"></div>
  <div class="card" id="kpi_trend"></div>
  <div class="card" id="edu_bar"></div>
  <div class="card" id="gender_pie"></div>
  <div class="card wide" id="income_box"></div>
  <div class="card wide" id="credit_hist"></div>
</main>
<script>
  const GRAPHS = {graphs_json};
  for (const [slot, fig] of Object.entries(GRAPHS)) {{
    const el = document.getElementById(slot);
    if (fig && fig.layout) {{
      Plotly.newPlot(el, fig.data || [], fig.layout, {{displayModeBar: false, responsive: true}});
    }} else {{
      el.innerHTML = '<div class="nodata">no data</div>';
    }}
  }}
</script>
</body>
</html>
"#
    )
}
