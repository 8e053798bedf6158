//! Access-point mode: pick a network and store its credentials.
//!
//! Runs only while no credentials are stored. Once they are saved the radios
//! are switched off and the device restarts into station mode.

use std::iter;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, error, info};

use picofan_core::codec::{escape_html, html_head, parse_form, simple_page};
use picofan_core::{CredentialStore, WifiCredentials};
use picofan_protocol::{ContentType, Method, ProtocolError, Request, ResponseHead};

use crate::assets::{self, AssetDir};
use crate::connection::Connection;
use crate::context::DeviceContext;
use crate::device::{AccessPointConfig, Radio};
use crate::error::ServerError;
use crate::server::{Handled, Service, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningState {
    Scanning,
    AwaitingSelection,
    Captured,
    Rebooting,
}

pub struct ProvisioningService<R> {
    radio: Arc<R>,
    credentials: CredentialStore,
    assets: AssetDir,
    networks: Vec<String>,
    access_point_ip: Ipv4Addr,
    credentials_delay: Duration,
    state: Mutex<ProvisioningState>,
}

impl<R: Radio> ProvisioningService<R> {
    /// Scan for networks, then bring up the access point.
    pub fn start(
        radio: Arc<R>,
        context: &DeviceContext,
        access_point: &AccessPointConfig,
        credentials_delay: Duration,
    ) -> Result<Self, ServerError> {
        let mut service = Self {
            radio,
            credentials: context.credentials.clone(),
            assets: context.assets.clone(),
            networks: Vec::new(),
            access_point_ip: Ipv4Addr::UNSPECIFIED,
            credentials_delay,
            state: Mutex::new(ProvisioningState::Scanning),
        };

        debug!("Scanning for networks");
        service.networks = visible_networks(service.radio.scan()?);
        info!("Found {} networks", service.networks.len());

        service.access_point_ip = service.radio.start_access_point(access_point)?;
        info!(
            "Access point '{}' up, password '{}', open http://{}/",
            access_point.ssid, access_point.password, service.access_point_ip
        );
        service.set_state(ProvisioningState::AwaitingSelection);
        Ok(service)
    }

    pub fn networks(&self) -> &[String] {
        &self.networks
    }

    pub fn access_point_ip(&self) -> Ipv4Addr {
        self.access_point_ip
    }

    pub fn state(&self) -> ProvisioningState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ProvisioningState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    async fn capture(&self, request: &Request, conn: &mut Connection) -> Handled {
        let body = match conn.read_url_encoded_body(request.content_length).await {
            Ok(body) => body,
            Err(e) => return Handled::failed(e),
        };
        let credentials = match parse_credentials(&body) {
            Ok(credentials) => credentials,
            Err(e) => return Handled::failed(e),
        };
        if let Err(e) = self.credentials.save(&credentials) {
            return Handled::failed(e);
        }
        self.set_state(ProvisioningState::Captured);

        let page = simple_page(
            "WiFi credentials saved",
            "<div>System will now restart and connect to the saved network</div>",
        );
        Handled::from(conn.write_page(&ResponseHead::html(), iter::once(page)).await)
            .then_restart(self.credentials_delay)
    }
}

impl<R: Radio + 'static> Service for ProvisioningService<R> {
    fn name(&self) -> &'static str {
        "provisioning"
    }

    async fn handle(&self, request: Request, conn: &mut Connection, _session: &Session) -> Handled {
        match (request.method, &request.content_type) {
            (Method::Get, _) if request.path() == "/" => conn
                .write_page(&ResponseHead::html(), login_page(&self.networks))
                .await
                .into(),
            (Method::Get, _) => assets::serve_target(&self.assets, &request.target, conn)
                .await
                .into(),
            (Method::Post, Some(ContentType::UrlEncoded)) => self.capture(&request, conn).await,
            (Method::Post, other) => {
                let content_type = match other {
                    Some(ContentType::Multipart { .. }) => "multipart/form-data".to_string(),
                    Some(ContentType::Other(other)) => other.clone(),
                    _ => String::new(),
                };
                Handled::failed(ProtocolError::UnsupportedContentType(content_type))
            }
        }
    }

    fn prepare_restart(&self) {
        self.set_state(ProvisioningState::Rebooting);
        if let Err(e) = self.radio.deactivate() {
            error!("{}", e);
        }
    }
}

/// Names of scanned networks that can be offered. Hidden networks and names
/// that are not UTF-8 are left out; scan order is kept.
pub fn visible_networks(scanned: Vec<Vec<u8>>) -> Vec<String> {
    scanned
        .into_iter()
        .filter_map(|ssid| String::from_utf8(ssid).ok())
        .filter(|ssid| !ssid.is_empty())
        .collect()
}

/// Read `ssid` and `password` from the login form. A missing password means
/// an open network.
pub fn parse_credentials(body: &str) -> Result<WifiCredentials, ServerError> {
    let fields = parse_form(body);
    let field = |name: &str| {
        fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    };

    let ssid = field("ssid").ok_or(ServerError::MissingField("ssid"))?;
    let password = field("password").unwrap_or_default();
    Ok(WifiCredentials::new(ssid, password))
}

/// Login page with a dropdown of networks, as HTML chunks.
pub fn login_page(networks: &[String]) -> impl Iterator<Item = String> + '_ {
    let head = format!(
        "{}<body>\n\
         <h1>Enter WiFi Info</h1>\n\
         <form action=\"\" method=\"post\">\n\
         <label for=\"ssid\">Network:&nbsp;&nbsp;</label>\n\
         <select name=\"ssid\" id=\"ssid\">\n",
        html_head()
    );
    let tail = "</select>\n\
                <br>\n\
                <label for=\"password\">Password:</label>\n\
                <input type=\"password\" id=\"password\" name=\"password\"><br><br>\n\
                <button type=\"submit\">Submit</button>\n\
                </form>\n\
                </body>\n\
                </html>\n"
        .to_string();

    iter::once(head)
        .chain(networks.iter().map(|ssid| {
            let ssid = escape_html(ssid);
            format!("<option value=\"{ssid}\">{ssid}</option>\n")
        }))
        .chain(iter::once(tail))
}
