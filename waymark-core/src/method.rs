use std::fmt;
use std::str::FromStr;

use axum::routing::MethodFilter;

use crate::error::{Result, WaymarkError};

/// HTTP verbs an endpoint can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Head,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 7] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
        HttpMethod::Patch,
        HttpMethod::Options,
        HttpMethod::Head,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
        }
    }

    pub(crate) fn filter(&self) -> MethodFilter {
        match self {
            HttpMethod::Get => MethodFilter::GET,
            HttpMethod::Post => MethodFilter::POST,
            HttpMethod::Put => MethodFilter::PUT,
            HttpMethod::Delete => MethodFilter::DELETE,
            HttpMethod::Patch => MethodFilter::PATCH,
            HttpMethod::Options => MethodFilter::OPTIONS,
            HttpMethod::Head => MethodFilter::HEAD,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = WaymarkError;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        HttpMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == upper)
            .ok_or_else(|| {
                WaymarkError::method(format!("unsupported HTTP method '{s}'")).with_context(
                    serde_json::json!({
                        "method": s,
                        "allowed": HttpMethod::ALL.iter().map(|m| m.as_str()).collect::<Vec<_>>(),
                    }),
                )
            })
    }
}

impl TryFrom<&axum::http::Method> for HttpMethod {
    type Error = WaymarkError;

    fn try_from(method: &axum::http::Method) -> Result<Self> {
        method.as_str().parse()
    }
}

/// Anything that names an HTTP verb: [`HttpMethod`] itself or a string.
pub trait IntoMethod {
    fn into_method(self) -> Result<HttpMethod>;
}

impl IntoMethod for HttpMethod {
    fn into_method(self) -> Result<HttpMethod> {
        Ok(self)
    }
}

impl IntoMethod for &str {
    fn into_method(self) -> Result<HttpMethod> {
        self.parse()
    }
}

impl IntoMethod for String {
    fn into_method(self) -> Result<HttpMethod> {
        self.parse()
    }
}

impl IntoMethod for &String {
    fn into_method(self) -> Result<HttpMethod> {
        self.parse()
    }
}

impl IntoMethod for axum::http::Method {
    fn into_method(self) -> Result<HttpMethod> {
        HttpMethod::try_from(&self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!(" Patch ".parse::<HttpMethod>().unwrap(), HttpMethod::Patch);
        assert_eq!("HEAD".into_method().unwrap(), HttpMethod::Head);
    }

    #[test]
    fn rejects_unknown_verbs() {
        let err = "TRACE".parse::<HttpMethod>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Method);
        assert_eq!(err.context().unwrap()["method"], "TRACE");
        assert!("".into_method().is_err());
    }

    #[test]
    fn display_matches_wire_name() {
        for m in HttpMethod::ALL {
            assert_eq!(m.to_string(), m.as_str());
            assert_eq!(m.as_str().parse::<HttpMethod>().unwrap(), m);
        }
    }
}
