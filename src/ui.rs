use crate::dashboard::{Dashboard, Panels, ViewConfig, Visualization};
use crate::models::{ALL_CITIES, ChartKind, DataSource, Dataset, Notice, NoticeLevel};
use crate::stats::format_stat;
use std::fmt::Write;

pub const PAGE_TITLE: &str = "Simple Data Visualization Dashboard";
pub const FOOTER: &str =
    "Example dashboard for data visualization, ready to deploy straight from GitHub.";

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn render_index(dashboard: &Dashboard) -> String {
    fill(
        INDEX_HTML,
        &[
            ("TITLE", PAGE_TITLE.to_string()),
            ("FOOTER", FOOTER.to_string()),
            ("SIDEBAR", render_sidebar(dashboard)),
            ("NOTICES", render_notices(&dashboard.notices)),
            (
                "TABLE",
                dashboard.dataset.as_ref().map(render_table).unwrap_or_default(),
            ),
            ("VISUALIZATION", render_visualization(&dashboard.visualization)),
        ],
    )
}

/// Substitutes `{{KEY}}` markers in one pass, so inserted text is never
/// scanned for markers again.
fn fill(template: &str, values: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = &after[..end];
                match values.iter().find(|(name, _)| *name == key) {
                    Some((_, value)) => out.push_str(value),
                    None => out.push_str(&rest[start..start + end + 4]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn render_notice(notice: &Notice) -> String {
    let class = match notice.level {
        NoticeLevel::Warning => "warning",
        NoticeLevel::Error => "error",
    };
    format!(
        r#"<div class="notice {class}" role="alert">{}</div>"#,
        escape_html(&notice.message)
    )
}

fn render_notices(notices: &[Notice]) -> String {
    notices.iter().map(render_notice).collect()
}

fn option(value: &str, label: &str, selected: bool) -> String {
    format!(
        r#"<option value="{}"{}>{}</option>"#,
        escape_html(value),
        if selected { " selected" } else { "" },
        escape_html(label)
    )
}

fn select(name: &str, label: &str, options: String) -> String {
    format!(
        r#"<label class="field"><span>{label}</span><select name="{name}" onchange="this.form.submit()">{options}</select></label>"#
    )
}

fn render_sidebar(dashboard: &Dashboard) -> String {
    let mut html = String::from(r#"<form class="controls" method="get" action="/">"#);
    html.push_str(r#"<fieldset class="field"><legend>Data source</legend>"#);
    for source in [DataSource::Sample, DataSource::Upload] {
        let _ = write!(
            html,
            r#"<label class="radio"><input type="radio" name="source" value="{}" onchange="this.form.submit()"{}> {}</label>"#,
            source.as_str(),
            if dashboard.source == source { " checked" } else { "" },
            source.label()
        );
    }
    html.push_str("</fieldset>");

    if let Some(config) = &dashboard.config {
        html.push_str(&render_chart_controls(config));
    }
    html.push_str(r#"<noscript><button type="submit">Apply</button></noscript></form>"#);

    if dashboard.source == DataSource::Upload {
        html.push_str(
            r#"<form class="upload" method="post" action="/upload" enctype="multipart/form-data"><label class="field"><span>Upload CSV file</span><input type="file" name="file" accept=".csv,text/csv"></label><button type="submit">Upload</button></form>"#,
        );
        if let Some(upload) = &dashboard.upload {
            let _ = write!(
                html,
                r#"<form class="upload" method="post" action="/upload/clear"><p class="hint">Current file: <code>{}</code> ({} bytes)</p><button type="submit" class="secondary">Remove file</button></form>"#,
                escape_html(&upload.file_name),
                upload.size
            );
        }
    }
    html
}

fn render_chart_controls(config: &ViewConfig) -> String {
    let selection = &config.selection;
    let mut html = String::from(r#"<hr><h3>Chart settings</h3>"#);

    let charts: String = config
        .options
        .charts
        .iter()
        .map(|kind| option(kind.as_str(), kind.label(), *kind == selection.chart))
        .collect();
    html.push_str(&select("chart", "Chart type", charts));

    let xs: String = config
        .options
        .x_columns
        .iter()
        .map(|name| option(name, name, *name == selection.x))
        .collect();
    html.push_str(&select("x", "X axis column", xs));

    let ys: String = config
        .options
        .y_columns
        .iter()
        .map(|name| option(name, name, *name == selection.y))
        .collect();
    html.push_str(&select("y", "Y axis column (numeric)", ys));

    if let Some(cities) = &config.options.cities {
        let current = selection.city.as_deref().unwrap_or(ALL_CITIES);
        let mut options = option(ALL_CITIES, "(All)", current == ALL_CITIES);
        for city in cities {
            options.push_str(&option(city, city, city == current));
        }
        html.push_str(&select("city", "City filter (optional)", options));
    }
    html
}

fn render_table(dataset: &Dataset) -> String {
    let mut html = String::from(
        r#"<section class="card"><h2>Data in use</h2><div class="table-wrap"><table><thead><tr><th></th>"#,
    );
    for column in &dataset.columns {
        let _ = write!(html, "<th>{}</th>", escape_html(&column.name));
    }
    html.push_str("</tr></thead><tbody>");
    for (index, row) in dataset.rows.iter().enumerate() {
        let _ = write!(html, r#"<tr><th class="index">{index}</th>"#);
        for (column, value) in dataset.columns.iter().zip(row) {
            let class = if column.kind.is_numeric() { " class=\"num\"" } else { "" };
            let text = if value.is_missing() {
                r#"<span class="missing">None</span>"#.to_string()
            } else {
                escape_html(&value.to_text())
            };
            let _ = write!(html, "<td{class}>{text}</td>");
        }
        html.push_str("</tr>");
    }
    let _ = write!(
        html,
        r#"</tbody></table></div><p class="hint">{} rows × {} columns</p></section>"#,
        dataset.len(),
        dataset.columns.len()
    );
    html
}

fn render_visualization(visualization: &Visualization) -> String {
    match visualization {
        Visualization::Hidden => String::new(),
        Visualization::NoNumericColumns(notice) | Visualization::Empty(notice) => {
            render_notice(notice)
        }
        Visualization::Ready(panels) => render_panels(panels),
    }
}

fn render_panels(panels: &Panels) -> String {
    let heading = match panels.chart_kind {
        ChartKind::Line => "Line Chart",
        ChartKind::Bar => "Bar Chart",
    };
    let chart = match &panels.chart {
        Ok(rendered) => format!(r#"<div class="chart-card">{}</div>"#, rendered.svg),
        Err(_) => render_notice(&Notice::error(panels.chart_error().unwrap_or_default())),
    };

    let mut stats = String::from("<table class=\"stats\"><tbody>");
    for (label, value) in panels.summary.rows() {
        let _ = write!(
            stats,
            r#"<tr><th>{label}</th><td class="num">{}</td></tr>"#,
            format_stat(value)
        );
    }
    let _ = write!(
        stats,
        r#"</tbody><caption>Name: {}</caption></table>"#,
        escape_html(&panels.y)
    );

    format!(
        r#"<section class="card"><h2>Data Visualization</h2><div class="panes"><div class="pane-chart"><h4>{heading}</h4>{chart}</div><div class="pane-stats"><h4>Summary Statistics</h4>{stats}<h4>Info</h4><p><strong>X axis:</strong> <code>{}</code><br><strong>Y axis:</strong> <code>{}</code><br><strong>Row count:</strong> {}</p></div></div></section>"#,
        escape_html(&panels.x),
        escape_html(&panels.y),
        panels.row_count
    )
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>{{TITLE}}</title>
  <style>
    @import url('https://fonts.googleapis.com/css2?family=Space+Grotesk:wght@400;500;600&family=Fraunces:wght@600&display=swap');

    :root {
      --bg-1: #f8f3e6;
      --bg-2: #f5d3a7;
      --ink: #2b2a28;
      --accent: #ff6b4a;
      --accent-2: #2f4858;
      --card: rgba(255, 255, 255, 0.86);
      --shadow: 0 24px 60px rgba(47, 72, 88, 0.18);
    }

    * {
      box-sizing: border-box;
    }

    body {
      margin: 0;
      min-height: 100vh;
      background: radial-gradient(circle at top, var(--bg-2), transparent 60%),
        linear-gradient(135deg, var(--bg-1), #ffe9d4 60%, #f9f2e9 100%);
      color: var(--ink);
      font-family: "Space Grotesk", "Trebuchet MS", sans-serif;
      display: grid;
      grid-template-columns: minmax(240px, 300px) 1fr;
      gap: 24px;
      padding: 32px 18px 48px;
    }

    aside,
    main {
      background: var(--card);
      backdrop-filter: blur(12px);
      border-radius: 28px;
      box-shadow: var(--shadow);
      padding: 28px;
    }

    aside {
      display: grid;
      align-content: start;
      gap: 18px;
    }

    main {
      display: grid;
      align-content: start;
      gap: 24px;
      min-width: 0;
    }

    h1 {
      font-family: "Fraunces", "Georgia", serif;
      font-weight: 600;
      font-size: clamp(2rem, 4vw, 2.6rem);
      margin: 0;
    }

    h2 {
      margin: 0 0 12px;
      font-size: 1.4rem;
    }

    h3,
    h4 {
      margin: 0 0 10px;
    }

    .subtitle {
      margin: 0;
      color: #5f5c57;
    }

    .controls,
    .upload {
      display: grid;
      gap: 14px;
    }

    .field {
      display: grid;
      gap: 6px;
      border: none;
      padding: 0;
      margin: 0;
    }

    .field span,
    .field legend {
      font-size: 0.85rem;
      text-transform: uppercase;
      letter-spacing: 0.12em;
      color: #8b857d;
    }

    .radio {
      display: block;
      padding: 4px 0;
    }

    select,
    input[type="file"] {
      font: inherit;
      padding: 8px 10px;
      border-radius: 12px;
      border: 1px solid rgba(47, 72, 88, 0.2);
      background: white;
    }

    button {
      appearance: none;
      border: none;
      border-radius: 999px;
      padding: 12px 18px;
      font: inherit;
      font-weight: 600;
      cursor: pointer;
      background: var(--accent);
      color: white;
      box-shadow: 0 10px 24px rgba(255, 107, 74, 0.3);
    }

    button.secondary {
      background: var(--accent-2);
      box-shadow: 0 10px 24px rgba(47, 72, 88, 0.3);
    }

    hr {
      border: none;
      border-top: 1px solid rgba(47, 72, 88, 0.12);
      width: 100%;
    }

    .card {
      background: white;
      border-radius: 20px;
      padding: 18px;
      border: 1px solid rgba(47, 72, 88, 0.08);
    }

    .table-wrap {
      max-height: 420px;
      overflow: auto;
    }

    table {
      border-collapse: collapse;
      width: 100%;
      font-size: 0.92rem;
    }

    th,
    td {
      padding: 6px 10px;
      border-bottom: 1px solid rgba(47, 72, 88, 0.08);
      text-align: left;
      white-space: nowrap;
    }

    td.num {
      text-align: right;
      font-variant-numeric: tabular-nums;
    }

    th.index {
      color: #8b857d;
      font-weight: 500;
    }

    .missing {
      color: #b3ada6;
    }

    .panes {
      display: grid;
      grid-template-columns: 2fr 1fr;
      gap: 20px;
    }

    .stats caption {
      caption-side: bottom;
      text-align: left;
      color: #8b857d;
      font-size: 0.85rem;
      padding-top: 6px;
    }

    .chart {
      width: 100%;
      display: block;
    }

    .chart text {
      font-family: "Space Grotesk", "Trebuchet MS", sans-serif;
    }

    .chart-line {
      fill: none;
      stroke: var(--accent);
      stroke-width: 3;
    }

    .chart-point {
      fill: white;
      stroke: var(--accent);
      stroke-width: 2;
    }

    .chart-bar {
      fill: var(--accent-2);
    }

    .chart-grid {
      stroke: rgba(47, 72, 88, 0.12);
    }

    .chart-axis {
      stroke: rgba(47, 72, 88, 0.25);
      stroke-dasharray: 4 6;
    }

    .chart-label {
      fill: #7a746d;
      font-size: 11px;
    }

    .chart-axis-label {
      fill: var(--ink);
      font-size: 12px;
    }

    .chart-title {
      fill: var(--ink);
      font-size: 14px;
      font-weight: 600;
    }

    .notice {
      border-radius: 14px;
      padding: 12px 16px;
      font-size: 0.95rem;
    }

    .notice.warning {
      background: #fff4d6;
      color: #8a5a00;
    }

    .notice.error {
      background: #ffe1dc;
      color: #c63b2b;
    }

    .hint {
      margin: 6px 0 0;
      color: #6f6a65;
      font-size: 0.9rem;
    }

    footer {
      grid-column: 1 / -1;
      text-align: center;
    }

    @media (max-width: 860px) {
      body {
        grid-template-columns: 1fr;
      }
      .panes {
        grid-template-columns: 1fr;
      }
    }
  </style>
</head>
<body>
  <aside>
    <h2>Settings</h2>
    {{SIDEBAR}}
  </aside>

  <main>
    <header>
      <h1>{{TITLE}}</h1>
      <p class="subtitle">This app can:</p>
      <ul class="subtitle">
        <li>Show data (the sample, or a CSV file you upload)</li>
        <li>Draw <strong>line charts</strong> and <strong>bar charts</strong> interactively</li>
      </ul>
    </header>

    {{NOTICES}}
    {{TABLE}}
    {{VISUALIZATION}}
  </main>

  <footer>
    <hr>
    <p class="hint">{{FOOTER}}</p>
  </footer>
</body>
</html>
"#;
