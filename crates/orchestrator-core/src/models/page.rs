use serde::{Deserialize, Deserializer, Serialize};

/// A list response.
///
/// Endpoints answer either with a bare JSON array or with a paginated
/// envelope `{"count": .., "next": .., "previous": .., "results": [..]}`.
/// Both shapes decode into `Page`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    pub count: Option<u64>,
    pub next: Option<String>,
    pub previous: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PageRepr<T> {
    Bare(Vec<T>),
    Envelope {
        results: Vec<T>,
        #[serde(default)]
        count: Option<u64>,
        #[serde(default)]
        next: Option<String>,
        #[serde(default)]
        previous: Option<String>,
    },
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Page<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match PageRepr::deserialize(deserializer)? {
            PageRepr::Bare(results) => Page {
                results,
                count: None,
                next: None,
                previous: None,
            },
            PageRepr::Envelope {
                results,
                count,
                next,
                previous,
            } => Page {
                results,
                count,
                next,
                previous,
            },
        })
    }
}

impl<T> Page<T> {
    pub fn into_vec(self) -> Vec<T> {
        self.results
    }

    pub fn has_more(&self) -> bool {
        self.next.is_some()
    }
}
