use std::fmt::Write;

use actix_web::{HttpResponse, web};

use super::{AppState, rates::weekly_statistics};
use crate::{
    currency::{BASE_CURRENCY, Currency},
    exchange_rate::RateTable,
    history::RateStatistics,
    metrics::{METRICS_PATH, Metrics},
};

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn rates_rows(table: &RateTable) -> String {
    let mut rows = String::new();
    for (currency, rate) in table.iter() {
        let _ = writeln!(
            rows,
            "<tr><td>{}</td><td>{rate}</td></tr>",
            escape_html(currency.code())
        );
    }
    rows
}

fn statistics_rows(stats: &[(Currency, RateStatistics)]) -> String {
    let mut rows = String::new();
    for (currency, s) in stats {
        let _ = writeln!(
            rows,
            "<tr><td>{}</td><td>{:.6}</td><td>{:.6}</td><td>{:.6}</td><td>{:.6}</td>\
             <td>{:+.2}%</td><td>{:.6}</td><td>{}</td></tr>",
            escape_html(currency.code()),
            s.current_rate,
            s.min_rate,
            s.max_rate,
            s.avg_rate,
            s.change_percent,
            s.volatility,
            s.total_records
        );
    }
    rows
}

/// Renders the page. `stats` is `None` when history could not be loaded.
pub fn render(table: &RateTable, stats: Option<&[(Currency, RateStatistics)]>) -> String {
    let statistics = match stats {
        Some(stats) if stats.iter().any(|(_, s)| s.total_records > 0) => format!(
            "<table><thead><tr><th>Currency</th><th>Current</th><th>Min</th><th>Max</th>\
             <th>Avg</th><th>Change</th><th>Volatility</th><th>Samples</th></tr></thead>\
             <tbody>\n{}</tbody></table>",
            statistics_rows(stats)
        ),
        Some(_) => "<p>No rate history recorded yet. Run <code>seed-history</code> to \
                    generate some.</p>"
            .to_string(),
        None => "<p>Rate history is unavailable right now.</p>".to_string(),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Currency Conversion API</title>
<style>
body {{ font-family: sans-serif; margin: 2rem; }}
table {{ border-collapse: collapse; margin-bottom: 2rem; }}
td, th {{ border: 1px solid #ccc; padding: 0.3rem 0.6rem; text-align: right; }}
</style>
</head>
<body>
<h1>Currency Conversion API</h1>
<p>Rates as of {updated} relative to {base}.</p>
<h2>Current rates</h2>
<table><thead><tr><th>Currency</th><th>Rate</th></tr></thead>
<tbody>
{rates}</tbody></table>
<h2>Last 7 days</h2>
{statistics}
<h2>Converting</h2>
<pre>curl -X POST /api/v1/convert \
  -H 'Authorization: Bearer &lt;token&gt;' \
  -H 'Content-Type: application/json' \
  -d '{{"amount": 100, "from_currency": "USD", "to_currency": "EUR"}}'</pre>
<p>
<a href="/api">API info</a> |
<a href="/health/detailed">Health</a> |
<a href="/api/v1/rates">Rates</a> |
<a href="/api/debug/user-activity">User activity</a> |
<a href="{metrics}">Metrics</a>
</p>
</body>
</html>
"#,
        updated = escape_html(&table.updated_at().to_rfc3339()),
        base = BASE_CURRENCY,
        rates = rates_rows(table),
        metrics = METRICS_PATH,
    )
}

pub async fn dashboard(state: web::Data<AppState>, metrics: web::Data<Metrics>) -> HttpResponse {
    let stats = match weekly_statistics(&state, &metrics).await {
        Ok(stats) => Some(stats),
        Err(e) => {
            log::error!("Failed to load dashboard statistics: {e}");
            None
        }
    };

    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(render(&state.rates, stats.as_deref()))
}
