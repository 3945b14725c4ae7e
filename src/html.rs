//! HTML page generator for the dashboard

use crate::dashboard::DashboardView;
use crate::data::Document;
use crate::error::{Error, Result};
use minijinja::Environment;
use std::path::{Path, PathBuf};

const STYLES: &str = r#"
        :root {
            --bg-primary: #0d1117;
            --bg-secondary: #161b22;
            --bg-tertiary: #21262d;
            --text-primary: #c9d1d9;
            --text-secondary: #8b949e;
            --text-muted: #6e7681;
            --border-color: #30363d;
            --accent-blue: #58a6ff;
            --accent-red: #f85149;
        }

        * { margin: 0; padding: 0; box-sizing: border-box; }

        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', 'Noto Sans', Helvetica, Arial, sans-serif;
            background: var(--bg-primary);
            color: var(--text-primary);
            line-height: 1.6;
            min-height: 100vh;
        }

        .container { max-width: 1400px; margin: 0 auto; padding: 2rem; }

        header {
            display: flex;
            justify-content: space-between;
            align-items: center;
            flex-wrap: wrap;
            gap: 1rem;
            margin-bottom: 1.5rem;
            padding: 1.5rem;
            background: var(--bg-secondary);
            border: 1px solid var(--border-color);
            border-radius: 12px;
        }

        h1 { font-size: 1.75rem; font-weight: 600; }
        .last-updated { color: var(--text-muted); font-size: 0.9rem; }

        .controls { display: flex; gap: 0.75rem; align-items: center; }
        .controls select, .controls button {
            background: var(--bg-tertiary);
            color: var(--text-primary);
            border: 1px solid var(--border-color);
            border-radius: 6px;
            padding: 0.35rem 0.75rem;
            font-size: 0.9rem;
            cursor: pointer;
        }

        .stats { display: flex; gap: 1rem; margin-bottom: 1.5rem; flex-wrap: wrap; }
        .stat {
            padding: 0.25rem 0.75rem;
            background: var(--bg-secondary);
            border: 1px solid var(--border-color);
            border-radius: 20px;
            font-size: 0.85rem;
            color: var(--text-secondary);
        }
        .stat-value { font-weight: 600; color: var(--accent-blue); }

        .legend { display: flex; flex-wrap: wrap; gap: 0.5rem; margin-bottom: 1.5rem; }
        .legend-item {
            display: flex;
            align-items: center;
            gap: 0.4rem;
            background: var(--bg-secondary);
            color: var(--text-primary);
            border: 1px solid var(--border-color);
            border-radius: 6px;
            padding: 0.25rem 0.6rem;
            font-size: 0.85rem;
            cursor: pointer;
        }
        .legend-item[aria-pressed="false"] { opacity: 0.4; text-decoration: line-through; }
        .legend-swatch { width: 10px; height: 10px; border-radius: 2px; }

        .chart-grid { display: grid; grid-template-columns: repeat(auto-fit, minmax(560px, 1fr)); gap: 1.5rem; }
        .chart-card {
            background: var(--bg-secondary);
            border: 1px solid var(--border-color);
            border-radius: 12px;
            overflow: hidden;
        }
        .chart-card h2 {
            font-size: 1.1rem;
            font-weight: 600;
            padding: 0.75rem 1.25rem;
            background: var(--bg-tertiary);
            border-bottom: 1px solid var(--border-color);
        }
        .chart-body { padding: 1rem; }
        .chart { width: 100%; height: auto; }
        .chart .grid { stroke: var(--border-color); stroke-width: 1; }
        .chart .axis { stroke: var(--text-muted); stroke-width: 1; }
        .chart .axis-label { fill: var(--text-secondary); font-size: 11px; }
        .chart .axis-title { fill: var(--text-secondary); font-size: 12px; }
        .chart .series-line, .chart .series-marker { transition: opacity 0.2s; }
        .chart .series-marker { cursor: pointer; }

        .no-data { text-align: center; padding: 3rem; color: var(--text-muted); }

        .error-view {
            margin: 4rem auto;
            max-width: 640px;
            text-align: center;
            padding: 2rem;
            background: var(--bg-secondary);
            border: 1px solid var(--accent-red);
            border-radius: 12px;
        }
        .error-view h2 { color: var(--accent-red); margin-bottom: 1rem; }
        .error-message { font-family: 'SF Mono', 'Fira Code', monospace; color: var(--text-secondary); }

        .toast {
            position: fixed;
            bottom: 1.5rem;
            right: 1.5rem;
            padding: 0.75rem 1.25rem;
            background: var(--bg-tertiary);
            border: 1px solid var(--accent-red);
            border-radius: 8px;
            transition: opacity 0.5s;
        }
        .toast.hidden { opacity: 0; }

        @media (max-width: 768px) {
            .container { padding: 1rem; }
            .chart-grid { grid-template-columns: 1fr; }
        }
"#;

/// HTML template for the dashboard page
const DASHBOARD_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{{ title }}</title>
    <style>{{ styles | safe }}</style>
</head>
<body>
    <div class="container">
        <header>
            <div>
                <h1>{{ title }}</h1>
                {% if generated_at %}
                <p class="last-updated">Generated: {{ generated_at }}</p>
                {% endif %}
            </div>
            <div class="controls">
                <select id="range-select" aria-label="Time range">
                    {% for range in ranges %}
                    <option value="{{ range.value }}" data-href="{{ range.href }}"{% if range.selected %} selected{% endif %}>{{ range.label }}</option>
                    {% endfor %}
                </select>
                <button id="refresh-button" type="button">Refresh</button>
            </div>
        </header>

        <div class="stats">
            <span class="stat"><span class="stat-value">{{ total_tests }}</span> tests</span>
            <span class="stat"><span class="stat-value">{{ configurations | length }}</span> configurations</span>
            <span class="stat"><span class="stat-value">{{ branches | length }}</span> branches</span>
            <span class="stat">{{ range_label }}</span>
        </div>

        <div class="legend">
            {% for entry in legend %}
            <button class="legend-item" type="button" data-kind="{{ entry.kind }}" data-value="{{ entry.label }}" aria-pressed="{{ 'true' if entry.active else 'false' }}">
                {% if entry.color %}<span class="legend-swatch" style="background: {{ entry.color }}"></span>{% endif %}
                {{ entry.label }}
            </button>
            {% endfor %}
        </div>

        <div class="chart-grid">
            {% for chart in charts %}
            <section class="chart-card" id="{{ chart.id }}">
                <h2>{{ chart.title }}</h2>
                <div class="chart-body">
                    {% if chart.svg %}
                    {{ chart.svg | safe }}
                    {% else %}
                    <div class="no-data">No data available</div>
                    {% endif %}
                </div>
            </section>
            {% endfor %}
        </div>
    </div>

    {% if toast %}
    <div class="toast" id="toast" role="alert">{{ toast }}</div>
    {% endif %}

    <script>
        const visible = { group: new Set(), operation: new Set() };
        const legendItems = document.querySelectorAll('.legend-item');

        function updateVisibility() {
            document.querySelectorAll('[data-key]').forEach(el => {
                const on = visible.group.has(el.dataset.group) && visible.operation.has(el.dataset.op);
                el.setAttribute('opacity', on ? '1' : '0');
            });
            legendItems.forEach(btn => {
                btn.setAttribute('aria-pressed', visible[btn.dataset.kind].has(btn.dataset.value) ? 'true' : 'false');
            });
        }

        legendItems.forEach(btn => {
            if (btn.getAttribute('aria-pressed') === 'true') {
                visible[btn.dataset.kind].add(btn.dataset.value);
            }
            btn.addEventListener('click', () => {
                const set = visible[btn.dataset.kind];
                if (!set.delete(btn.dataset.value)) {
                    set.add(btn.dataset.value);
                }
                updateVisibility();
            });
        });

        const select = document.getElementById('range-select');
        let currentRange = select.value;
        select.addEventListener('change', () => {
            const option = select.options[select.selectedIndex];
            if (confirm('Reload the dashboard with ' + option.text + '?')) {
                window.location.href = option.dataset.href;
            } else {
                select.value = currentRange;
            }
        });

        const refreshButton = document.getElementById('refresh-button');
        refreshButton.addEventListener('click', () => {
            refreshButton.disabled = true;
            window.location.reload();
        });

        const toast = document.getElementById('toast');
        if (toast) {
            setTimeout(() => {
                toast.classList.add('hidden');
                setTimeout(() => toast.remove(), 500);
            }, 5000);
        }
    </script>
</body>
</html>
"#;

/// Full-page error view shown when the initial load fails
const ERROR_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{{ title }}</title>
    <style>{{ styles | safe }}</style>
</head>
<body>
    <div class="container">
        <div class="error-view" role="alert">
            <h2>Failed to Load Data</h2>
            <p class="error-message">{{ page_error }}</p>
            <p>Reload the page to try again.</p>
        </div>
    </div>
</body>
</html>
"#;

#[derive(serde::Serialize)]
struct PageContext<'a> {
    #[serde(flatten)]
    view: &'a DashboardView,
    styles: &'static str,
}

fn environment() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.add_template("dashboard.html", DASHBOARD_TEMPLATE)?;
    env.add_template("error.html", ERROR_TEMPLATE)?;
    Ok(env)
}

/// Render the dashboard page, or the error page if the initial load failed
pub fn generate_page(view: &DashboardView) -> Result<String> {
    let env = environment()?;
    let name = if view.page_error.is_some() {
        "error.html"
    } else {
        "dashboard.html"
    };

    let template = env.get_template(name)?;
    let html = template.render(PageContext {
        view,
        styles: STYLES,
    })?;

    Ok(html)
}

/// Write `index.html` and, when available, a `data.json` copy of the document
pub fn write_dashboard(
    view: &DashboardView,
    document: Option<&Document>,
    output_dir: &Path,
) -> Result<PathBuf> {
    let write = |path: &Path, content: String| {
        std::fs::write(path, content).map_err(|e| Error::FileWriteError {
            path: path.display().to_string(),
            source: e,
        })
    };

    std::fs::create_dir_all(output_dir).map_err(|e| Error::FileWriteError {
        path: output_dir.display().to_string(),
        source: e,
    })?;

    let index_path = output_dir.join("index.html");
    write(&index_path, generate_page(view)?)?;

    if let Some(document) = document {
        let data_path = output_dir.join("data.json");
        write(&data_path, serde_json::to_string_pretty(document)?)?;
    }

    Ok(index_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::{ChartViewData, LegendEntry, RangeOption};

    fn view() -> DashboardView {
        DashboardView {
            title: "Perf <Nightly>".to_string(),
            generated_at: Some("2024-01-02 00:00:00 UTC".to_string()),
            total_tests: 12,
            configurations: vec!["nvme".to_string()],
            branches: vec!["main".to_string(), "dev".to_string()],
            range_label: "last 30 days".to_string(),
            ranges: vec![RangeOption {
                value: "30".to_string(),
                label: "last 30 days".to_string(),
                href: "?days=30".to_string(),
                selected: true,
            }],
            charts: vec![
                ChartViewData {
                    id: "chart-iops-by-config".to_string(),
                    title: "IOPS by Configuration".to_string(),
                    svg: Some("<svg id=\"chart-iops-by-config-svg\"></svg>".to_string()),
                },
                ChartViewData {
                    id: "chart-latency-by-config".to_string(),
                    title: "Latency by Configuration".to_string(),
                    svg: None,
                },
            ],
            legend: vec![LegendEntry {
                label: "nvme".to_string(),
                kind: "group",
                color: Some("#58a6ff".to_string()),
                active: false,
            }],
            page_error: None,
            toast: None,
        }
    }

    #[test]
    fn test_generate_page_with_charts_and_placeholder() {
        let html = generate_page(&view()).unwrap();
        assert!(html.contains("Perf &lt;Nightly&gt;"));
        assert!(html.contains("<svg id=\"chart-iops-by-config-svg\"></svg>"));
        assert!(html.contains("No data available"));
        assert!(html.contains("aria-pressed=\"false\""));
        assert!(html.contains("data-href=\"?days=30\""));
        assert!(!html.contains("class=\"toast\""));
    }

    #[test]
    fn test_generate_page_toast() {
        let mut view = view();
        view.toast = Some("Refresh failed: HTTP error".to_string());
        let html = generate_page(&view).unwrap();
        assert!(html.contains("Refresh failed: HTTP error"));
    }

    #[test]
    fn test_generate_error_page() {
        let mut view = view();
        view.page_error = Some("Failed to read file: data.json".to_string());
        let html = generate_page(&view).unwrap();
        assert!(html.contains("Failed to Load Data"));
        assert!(html.contains("Failed to read file: data.json"));
        assert!(!html.contains("chart-grid\">"));
    }
}
