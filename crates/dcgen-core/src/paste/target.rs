//! Paste targets.

use std::fmt;

use dcgen_proto::RecordId;

use crate::error::Error;

/// Where pasted records land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasteTarget {
    /// Directly after a sibling.
    After(RecordId),
    /// At the front of a parent's children.
    Into(RecordId),
    /// At the front of the top level, or of a parent's children when given.
    Top(Option<RecordId>),
}

impl PasteTarget {
    /// Resolve the target from request parameters in their serialized form.
    ///
    /// At most one of `after` and `into` may be set. `top` set to an empty
    /// string means the top level without a parent. Malformed ids are an
    /// invalid argument; no usable parameter at all is an invalid-parameters
    /// error.
    pub fn from_params(
        after: Option<&str>,
        into: Option<&str>,
        top: Option<&str>,
    ) -> Result<Self, Error> {
        let after = after.map(str::trim).filter(|s| !s.is_empty());
        let into = into.map(str::trim).filter(|s| !s.is_empty());

        match (after, into, top.map(str::trim)) {
            (Some(_), Some(_), _) | (Some(_), None, Some(_)) | (None, Some(_), Some(_)) => {
                Err(Error::InvalidParameters(
                    "after, into and top are mutually exclusive".to_string(),
                ))
            }
            (Some(after), None, None) => Ok(PasteTarget::After(RecordId::parse(after)?)),
            (None, Some(into), None) => Ok(PasteTarget::Into(RecordId::parse(into)?)),
            (None, None, Some("")) => Ok(PasteTarget::Top(None)),
            (None, None, Some(top)) => Ok(PasteTarget::Top(Some(RecordId::parse(top)?))),
            (None, None, None) => Err(Error::InvalidParameters(
                "none of after, into or top was given".to_string(),
            )),
        }
    }

    /// The record the target refers to, if any.
    pub fn reference(&self) -> Option<&RecordId> {
        match self {
            PasteTarget::After(id) | PasteTarget::Into(id) => Some(id),
            PasteTarget::Top(parent) => parent.as_ref(),
        }
    }
}

impl fmt::Display for PasteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PasteTarget::After(id) => write!(f, "after {}", id),
            PasteTarget::Into(id) => write!(f, "into {}", id),
            PasteTarget::Top(Some(id)) => write!(f, "top of {}", id),
            PasteTarget::Top(None) => write!(f, "top"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_params() {
        assert_eq!(
            PasteTarget::from_params(Some("tl_page::4"), None, None).unwrap(),
            PasteTarget::After(RecordId::new("tl_page", 4))
        );
        assert_eq!(
            PasteTarget::from_params(None, Some("tl_page::\"a\""), None).unwrap(),
            PasteTarget::Into(RecordId::new("tl_page", "a"))
        );
        assert_eq!(PasteTarget::from_params(None, None, Some("")).unwrap(), PasteTarget::Top(None));
        assert_eq!(
            PasteTarget::from_params(Some(""), None, Some("tl_article::2")).unwrap(),
            PasteTarget::Top(Some(RecordId::new("tl_article", 2)))
        );
    }

    #[test]
    fn test_from_params_errors() {
        assert!(matches!(
            PasteTarget::from_params(None, None, None),
            Err(Error::InvalidParameters(_))
        ));
        assert!(matches!(
            PasteTarget::from_params(Some(" "), Some(""), None),
            Err(Error::InvalidParameters(_))
        ));
        assert!(matches!(
            PasteTarget::from_params(Some("tl_page::1"), Some("tl_page::2"), None),
            Err(Error::InvalidParameters(_))
        ));
        assert!(matches!(
            PasteTarget::from_params(Some("tl_page"), None, None),
            Err(Error::InvalidArgument(_))
        ));
    }
}
