//! Provider connectors and the registry resolving them by kind.
//!
//! One adapter per provider, each implementing only the capability tiers its
//! provider supports:
//!
//! | provider        | capabilities                  | protocol          |
//! |-----------------|-------------------------------|-------------------|
//! | Google Calendar | CalendarRead + CalendarWrite  | OAuth REST        |
//! | Outlook         | CalendarRead + CalendarWrite  | OAuth REST (Graph)|
//! | CalDAV family   | CalendarRead + CalendarWrite  | CalDAV + app pass |
//! | Notion          | NotesWrite                    | OAuth REST        |

mod caldav;
mod google;
mod microsoft;
mod notion;

use std::sync::Arc;

use calbridge_core::{CalendarConnector, Connector, NotesWrite};
use calbridge_domain::{CalbridgeError, ProviderKind, ProvidersConfig};

pub use caldav::CalDavConnector;
pub use google::GoogleCalendarConnector;
pub use microsoft::MicrosoftCalendarConnector;
pub use notion::NotionConnector;

use crate::errors::{classify_status, retry_after_secs};
use crate::http::HttpClient;

/// Convert a non-success provider response into a classified error,
/// consuming the body for diagnostics.
pub(crate) async fn response_failure(response: reqwest::Response) -> CalbridgeError {
    let status = response.status();
    let retry_after = retry_after_secs(&response);
    let body = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
    classify_status(status, retry_after, &body).into()
}

/// Registry of configured connector instances.
pub struct ConnectorRegistry {
    google: Arc<GoogleCalendarConnector>,
    microsoft: Arc<MicrosoftCalendarConnector>,
    caldav: Option<Arc<CalDavConnector>>,
    notion: Arc<NotionConnector>,
}

impl ConnectorRegistry {
    pub fn new(http: HttpClient, config: &ProvidersConfig) -> Self {
        Self {
            google: Arc::new(GoogleCalendarConnector::new(http.clone(), config.google.clone())),
            microsoft: Arc::new(MicrosoftCalendarConnector::new(
                http.clone(),
                config.microsoft.clone(),
            )),
            caldav: config
                .caldav_url
                .as_ref()
                .map(|url| Arc::new(CalDavConnector::new(http.clone(), url.clone()))),
            notion: Arc::new(NotionConnector::new(http)),
        }
    }

    /// Base connector (connection test, token refresh) for a provider.
    pub fn base(&self, provider: ProviderKind) -> Option<Arc<dyn Connector>> {
        match provider {
            ProviderKind::GoogleCalendar => Some(self.google.clone()),
            ProviderKind::Outlook => Some(self.microsoft.clone()),
            ProviderKind::CalDav => self.caldav.clone().map(|c| c as Arc<dyn Connector>),
            ProviderKind::Notion => Some(self.notion.clone()),
        }
    }

    /// Full calendar connector, when the provider has that capability tier.
    pub fn calendar(&self, provider: ProviderKind) -> Option<Arc<dyn CalendarConnector>> {
        match provider {
            ProviderKind::GoogleCalendar => Some(self.google.clone()),
            ProviderKind::Outlook => Some(self.microsoft.clone()),
            ProviderKind::CalDav => self.caldav.clone().map(|c| c as Arc<dyn CalendarConnector>),
            ProviderKind::Notion => None,
        }
    }

    /// Notes connector, when the provider has that capability tier.
    pub fn notes(&self, provider: ProviderKind) -> Option<Arc<dyn NotesWrite>> {
        match provider {
            ProviderKind::Notion => Some(self.notion.clone()),
            _ => None,
        }
    }
}
