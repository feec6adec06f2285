//! HTML status page.
//!
//! The page is a handlebars template rendered from a [`PageModel`]. Values
//! are HTML-escaped by handlebars, so channel names and failure reasons can
//! be rendered as-is.

use crate::files::RecordedFile;
use chrono::{DateTime, Local};
use handlebars::{Handlebars, RenderError, TemplateError};
use serde::Serialize;
use streamrec::RecordingsSnapshot;

const PAGE: &str = "page";

#[derive(Debug, Serialize)]
pub struct RecordingRow {
    pub id: String,
    pub name: String,
    pub duration: String,
}

#[derive(Debug, Serialize)]
pub struct FailureRow {
    pub id: String,
    pub name: String,
    pub time: String,
    pub reason: String,
}

/// Everything the status page shows.
#[derive(Debug, Serialize)]
pub struct PageModel {
    pub recordings: Vec<RecordingRow>,
    pub failures: Vec<FailureRow>,
    pub files: Vec<RecordedFile>,
    pub can_transcode: bool,
}

impl PageModel {
    pub fn new(snapshot: RecordingsSnapshot, files: Vec<RecordedFile>, can_transcode: bool) -> Self {
        let recordings = snapshot
            .active
            .into_iter()
            .map(|r| RecordingRow {
                id: r.id.to_string(),
                name: r.filename,
                duration: format_elapsed(r.elapsed_secs),
            })
            .collect();

        let failures = snapshot
            .failed
            .into_iter()
            .map(|f| FailureRow {
                id: f.id.to_string(),
                name: f.filename,
                time: format_start_time(&f.started_at),
                reason: f.reason,
            })
            .collect();

        Self {
            recordings,
            failures,
            files,
            can_transcode,
        }
    }
}

/// Compiled page templates.
pub struct Pages {
    registry: Handlebars<'static>,
}

impl Pages {
    pub fn new() -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_template_string(PAGE, PAGE_TEMPLATE)?;
        Ok(Self { registry })
    }

    pub fn render(&self, model: &PageModel) -> Result<String, RenderError> {
        self.registry.render(PAGE, model)
    }
}

/// Whole seconds as `45s`, `2m5s` or `1h2m3s`.
pub fn format_elapsed(secs: u64) -> String {
    let (hours, minutes, seconds) = (secs / 3600, (secs / 60) % 60, secs % 60);
    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// RFC 1123 style with a numeric zone: `Sat, 09 Mar 2024 07:05:01 +0100`.
pub fn format_start_time(at: &DateTime<Local>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S %z").to_string()
}

const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>StreaMan</title>
</head>
<body>

<h1>Active Recordings</h1>

<table>
    <thead>
    <tr>
        <td>Name</td>
        <td>Time</td>
        <td>Action</td>
    </tr>
    </thead>
    <tbody>
    {{#each recordings}}
        <tr>
            <td>{{name}}</td>
            <td>{{duration}}</td>
            <td>
                <form style="display: inline;" action="./stop-recording" method="post">
                    <input type="hidden" name="id" value="{{id}}"/>
                    <input type="submit" value="Stop"/>
                </form>
            </td>
        </tr>
    {{/each}}
    </tbody>
</table>

<h1>Record</h1>

<form action="./record" method="post">
    <div>
        <label for="channel">Channel: </label> <input name="channel" id="channel"/>
    </div>
    {{#if can_transcode}}
        <div>
            <label for="transcode">Transcode video to h265</label>
            <input type="checkbox" name="transcode" id="transcode"/>
        </div>
    {{/if}}
    <div>
        <input type="submit" value="Record"/>
    </div>
</form>

<h1>Failed Recordings</h1>

<table>
    <thead>
    <tr>
        <td>Name</td>
        <td>Start</td>
        <td>Reason</td>
        <td>Action</td>
    </tr>
    </thead>
    <tbody>
    {{#each failures}}
        <tr>
            <td>{{name}}</td>
            <td>{{time}}</td>
            <td>{{reason}}</td>
            <td>
                <form style="display: inline;" action="./delete-failure" method="post">
                    <input type="hidden" name="id" value="{{id}}"/>
                    <input type="submit" value="Delete"/>
                </form>
            </td>
        </tr>
    {{/each}}
    </tbody>
</table>

<h1>Old Recordings</h1>

{{#each files}}
    <a href="./files/{{href}}">{{name}}</a> (Size: {{size_human}})<br/>
{{/each}}

</body>
</html>
"#;
