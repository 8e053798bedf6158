//! Station-mode web interface: device settings and file management.
//!
//! Every mutating request ends in a restart, which is also how a failed
//! write is recovered from.

use std::iter;
use std::time::Duration;

use tracing::{debug, info};

use picofan_core::codec::{escape_html, html_head, simple_page};
use picofan_core::files::{deletion_report, parse_deletion_request, upload_form, upload_report, DELETE_MARKER};
use picofan_core::{ConfigDocument, ConfigValue, Section};
use picofan_protocol::{ContentType, Method, ProtocolError, Request, ResponseHead};

use crate::assets::{self, Asset};
use crate::connection::Connection;
use crate::context::DeviceContext;
use crate::error::ServerError;
use crate::server::{Handled, Service, Session};

/// A url-encoded body containing this is a settings submission.
pub const SETTINGS_MARKER: &str = "hostname=";

const HARDWARE_LIMIT_NOTE: &str = "Increasing this would require hardware changes";

/// Ceiling on the options of a `num_` select. The stored limit comes from a
/// form field and is not trusted.
pub const MAX_SELECT_OPTIONS: i64 = 64;

/// Where a request goes, decided from its head alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Settings,
    DeletionForm,
    UploadForm,
    Asset(String),
    Form,
    Upload { boundary: String },
    Unsupported(String),
}

pub fn route(request: &Request) -> Route {
    match request.method {
        Method::Get if request.path() == "/" => Route::Settings,
        Method::Get if request.target.contains("delete") => Route::DeletionForm,
        Method::Get if request.target.contains("upload") => Route::UploadForm,
        Method::Get => Route::Asset(request.target.clone()),
        Method::Post => match &request.content_type {
            Some(ContentType::UrlEncoded) => Route::Form,
            Some(ContentType::Multipart { boundary }) => Route::Upload {
                boundary: boundary.clone(),
            },
            Some(ContentType::Other(other)) => Route::Unsupported(other.clone()),
            None => Route::Unsupported(String::new()),
        },
    }
}

/// Kind of url-encoded submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
    Settings,
    Deletion,
    Unrecognized,
}

impl FormKind {
    pub fn classify(body: &str) -> Self {
        if body.contains(SETTINGS_MARKER) {
            FormKind::Settings
        } else if body.contains(&format!("{DELETE_MARKER}={DELETE_MARKER}")) {
            FormKind::Deletion
        } else {
            FormKind::Unrecognized
        }
    }
}

pub struct ManagementService {
    context: DeviceContext,
    reboot_delay: Duration,
}

impl ManagementService {
    pub fn new(context: DeviceContext, reboot_delay: Duration) -> Self {
        Self {
            context,
            reboot_delay,
        }
    }

    async fn settings(&self, conn: &mut Connection) -> Result<(), ServerError> {
        let document = self.context.config.load()?;
        conn.write_page(&ResponseHead::html(), settings_page(&document))
            .await
    }

    async fn deletion_form(&self, conn: &mut Connection) -> Result<(), ServerError> {
        let chunks = self.context.files.deletion_form()?;
        conn.write_page(&ResponseHead::html(), chunks).await
    }

    async fn submit_form(&self, request: &Request, conn: &mut Connection) -> Handled {
        let body = match conn.read_url_encoded_body(request.content_length).await {
            Ok(body) => body,
            Err(e) => return Handled::failed(e),
        };

        match FormKind::classify(&body) {
            FormKind::Settings => {
                Handled::from(self.write_settings(&body, conn).await).then_restart(self.reboot_delay)
            }
            FormKind::Deletion => {
                Handled::from(self.delete_files(&body, conn).await).then_restart(self.reboot_delay)
            }
            FormKind::Unrecognized => Handled::failed(ServerError::UnrecognizedForm),
        }
    }

    async fn write_settings(&self, body: &str, conn: &mut Connection) -> Result<(), ServerError> {
        let document = ConfigDocument::from_form(body)?;
        self.context.config.save(&document)?;
        info!("Settings saved ({} sections)", document.len());

        let page = simple_page(
            "Updated Configs Saved",
            "<div>System will now restart to apply updates</div>",
        );
        conn.write_page(&ResponseHead::html(), iter::once(page)).await
    }

    async fn delete_files(&self, body: &str, conn: &mut Connection) -> Result<(), ServerError> {
        let names = parse_deletion_request(body);
        let deleted = self.context.files.delete_files(&names)?;
        conn.write_page(&ResponseHead::html(), deletion_report(&deleted))
            .await
    }

    async fn upload(
        &self,
        request: &Request,
        boundary: &str,
        conn: &mut Connection,
    ) -> Result<(), ServerError> {
        let upload = conn
            .read_multipart_body(request.content_length, boundary, &self.context.files)
            .await?;
        info!("Stored upload '{}' ({} bytes)", upload.name, upload.size);
        conn.write_page(&ResponseHead::html(), iter::once(upload_report(&upload.name)))
            .await
    }
}

impl Service for ManagementService {
    fn name(&self) -> &'static str {
        "management"
    }

    async fn handle(&self, request: Request, conn: &mut Connection, _session: &Session) -> Handled {
        let route = route(&request);
        debug!("Routing {} to {:?}", request.target, route);

        match route {
            Route::Settings => self.settings(conn).await.into(),
            Route::DeletionForm => self.deletion_form(conn).await.into(),
            Route::UploadForm => conn
                .write_page(&ResponseHead::html(), iter::once(upload_form()))
                .await
                .into(),
            Route::Asset(target) => assets::serve_target(&self.context.assets, &target, conn)
                .await
                .into(),
            Route::Form => self.submit_form(&request, conn).await,
            Route::Upload { boundary } => Handled::from(self.upload(&request, &boundary, conn).await)
                .then_restart(self.reboot_delay),
            Route::Unsupported(content_type) => {
                Handled::failed(ProtocolError::UnsupportedContentType(content_type))
            }
        }
    }
}

/// The settings page as HTML chunks, one per section.
pub fn settings_page(document: &ConfigDocument) -> impl Iterator<Item = String> + '_ {
    let head = format!(
        "{}<body>\n\
         <h1>PicoFan Config</h1>\n\
         <div class=\"buttons\">\n\
         <button onclick=\"location.href='upload'\">Upload Files</button>\n\
         <button onclick=\"location.href='delete'\">Delete Files</button>\n\
         </div>\n\
         <form id=\"config\" action=\"\" method=\"post\">\n",
        html_head()
    );
    let tail = "<button type=\"submit\">Submit</button>\n\
                </form>\n\
                <script src=script.js></script>\n\
                </body>\n\
                </html>\n"
        .to_string();

    iter::once(head)
        .chain(
            document
                .sections()
                .map(|(name, fields)| section_html(name, fields)),
        )
        .chain(iter::once(tail))
}

/// One section of the settings form.
///
/// Field names are submitted as `section_field`, which is how the form is
/// turned back into a document.
pub fn section_html(section: &str, fields: &Section) -> String {
    let mut html = format!(
        "<div class=\"{0}_div\">\n<br><h2>{0}</h2>\n",
        escape_html(section)
    );
    let mut entries_open = false;

    for (field, value) in fields {
        let id = escape_html(&format!("{section}_{field}"));
        let label = format!("<label for=\"{id}\">{}: </label>\n", escape_html(field));

        if field.contains("num_") {
            let current = value.as_integer().unwrap_or(1);
            let max = fields
                .get(&format!("max_{section}"))
                .and_then(ConfigValue::as_integer)
                .unwrap_or(current)
                .min(MAX_SELECT_OPTIONS);
            html.push_str(&label);
            html.push_str(&format!("<select name=\"{id}\" id=\"{id}\">\n"));
            for option in 1..=max {
                html.push_str(&select_option(&option.to_string(), option == current));
            }
            html.push_str("</select><br>\n");
        } else if field.contains("max_") && !field.contains("temp") {
            html.push_str("<div class=\"tooltip\">\n");
            html.push_str(&label);
            html.push_str(&format!(
                "<span class=\"tooltiptext\">{HARDWARE_LIMIT_NOTE}</span>\n"
            ));
            html.push_str(&text_input(&id, value, true));
            html.push_str("</div>\n");
        } else if let ConfigValue::Boolean(current) = value {
            html.push_str(&label);
            html.push_str(&format!("<select name=\"{id}\" id=\"{id}\">\n"));
            html.push_str(&select_option("true", *current));
            html.push_str(&select_option("false", !*current));
            html.push_str("</select><br>\n");
        } else {
            if !entries_open {
                html.push_str(&format!(
                    "<div id=\"{}_entries\">\n",
                    escape_html(section)
                ));
                entries_open = true;
            }
            html.push_str(&label);
            html.push_str(&text_input(&id, value, false));
        }
    }

    if entries_open {
        html.push_str("</div>\n");
    }
    html.push_str("</div>\n");
    html
}

fn select_option(value: &str, selected: bool) -> String {
    if selected {
        format!("<option value={value} selected=\"selected\">{value}</option>\n")
    } else {
        format!("<option value={value}>{value}</option>\n")
    }
}

fn text_input(id: &str, value: &ConfigValue, readonly: bool) -> String {
    format!(
        "<input type=\"text\" id=\"{id}\" name=\"{id}\" value=\"{}\"{}><br>\n",
        escape_html(&value.to_string()),
        if readonly { " readonly" } else { "" }
    )
}
