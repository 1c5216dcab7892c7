//! Route classification.
//!
//! Every intercepted request gets exactly one [`ResourceClass`], decided by a
//! pure function of its method, destination and URL. Rules are checked in a
//! fixed precedence order and the first match wins:
//!
//! 1. path ends with the probe marker -> `ConnectivityProbe`
//! 2. navigation -> `Document`, or `Denied` if the path is denylisted
//! 3. script/style destination -> `ScriptOrStyle`
//! 4. image / font destination
//! 5. primary history mirror -> `FirstPartyFeed`
//! 6. secondary history mirror -> `CrossOriginFeedB`
//! 7. latest-value document -> `CrossOriginFeedA`
//! 8. manifest/text/XML extension -> `ManifestOrText`
//! 9. anything else -> `Denied` (left to the network untouched)

use std::fmt;

use regex::{Regex, RegexSet};
use serde::Serialize;
use url::Url;

use haven_core::{Destination, Error, Request, RoutesConfig};

use crate::fetch::origin_of;

/// Resource class of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceClass {
    Document,
    ScriptOrStyle,
    Image,
    Font,
    /// Versioned historical snapshots from the primary CDN mirror.
    FirstPartyFeed,
    /// The singleton "latest value" document.
    CrossOriginFeedA,
    /// Versioned historical snapshots from the secondary mirror.
    CrossOriginFeedB,
    ManifestOrText,
    ConnectivityProbe,
    Denied,
}

impl ResourceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceClass::Document => "document",
            ResourceClass::ScriptOrStyle => "script-or-style",
            ResourceClass::Image => "image",
            ResourceClass::Font => "font",
            ResourceClass::FirstPartyFeed => "first-party-feed",
            ResourceClass::CrossOriginFeedA => "cross-origin-feed-a",
            ResourceClass::CrossOriginFeedB => "cross-origin-feed-b",
            ResourceClass::ManifestOrText => "manifest-or-text",
            ResourceClass::ConnectivityProbe => "connectivity-probe",
            ResourceClass::Denied => "denied",
        }
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiled routing rules.
#[derive(Debug, Clone)]
pub struct RouteClassifier {
    probe_marker: String,
    history_primary_origin: String,
    history_mirror_origin: String,
    history_path_marker: String,
    latest_feed_path: String,
    denylist: RegexSet,
    text_assets: Regex,
}

fn normalize_origin(field: &str, origin: &str) -> Result<String, Error> {
    let url = Url::parse(origin).map_err(|e| Error::InvalidUrl(format!("routes.{field}: {e}")))?;
    Ok(origin_of(&url))
}

impl RouteClassifier {
    /// Compile the classifier from configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` for a malformed feed origin and
    /// `Error::InvalidInput` for a denylist entry that is not a valid regex.
    pub fn new(routes: &RoutesConfig) -> Result<Self, Error> {
        let denylist = RegexSet::new(&routes.navigation_denylist)
            .map_err(|e| Error::InvalidInput(format!("navigation denylist: {e}")))?;
        let text_assets = Regex::new(r"\.(webmanifest|txt|xml)$")
            .map_err(|e| Error::InvalidInput(e.to_string()))?;

        Ok(Self {
            probe_marker: routes.probe_marker.clone(),
            history_primary_origin: normalize_origin("history_primary_origin", &routes.history_primary_origin)?,
            history_mirror_origin: normalize_origin("history_mirror_origin", &routes.history_mirror_origin)?,
            history_path_marker: routes.history_path_marker.clone(),
            latest_feed_path: routes.latest_feed_path.clone(),
            denylist,
            text_assets,
        })
    }

    /// Whether navigation interception must leave this path alone.
    pub fn is_denylisted(&self, path: &str) -> bool {
        self.denylist.is_match(path)
    }

    fn is_history_snapshot(&self, url: &Url) -> bool {
        let path = url.path();
        path.contains(&self.history_path_marker) && path.ends_with(".json")
    }

    pub fn classify(&self, request: &Request) -> ResourceClass {
        let url = &request.url;
        let path = url.path();

        if !self.probe_marker.is_empty() && path.ends_with(&self.probe_marker) {
            return ResourceClass::ConnectivityProbe;
        }

        if request.is_navigation() || request.destination == Destination::Document {
            if self.is_denylisted(path) {
                return ResourceClass::Denied;
            }
            return ResourceClass::Document;
        }

        match request.destination {
            Destination::Script | Destination::Style => return ResourceClass::ScriptOrStyle,
            Destination::Image => return ResourceClass::Image,
            Destination::Font => return ResourceClass::Font,
            _ => {}
        }

        let origin = origin_of(url);
        if origin == self.history_primary_origin && self.is_history_snapshot(url) {
            return ResourceClass::FirstPartyFeed;
        }
        if origin == self.history_mirror_origin {
            if self.is_history_snapshot(url) {
                return ResourceClass::CrossOriginFeedB;
            }
            if path.contains(&self.latest_feed_path) {
                return ResourceClass::CrossOriginFeedA;
            }
        }

        if self.text_assets.is_match(path) {
            return ResourceClass::ManifestOrText;
        }

        ResourceClass::Denied
    }
}
