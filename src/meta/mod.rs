//! Media metadata model.
//!
//! [`Metadata`] is a tagged union over unknown/movie/series/episode variants;
//! the discriminator is persisted in the JSON `type` field. All variants share
//! the attributes of [`Common`].

pub mod source;
pub mod tmdb;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Kind of metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    #[default]
    Unknown,
    Movie,
    Series,
    Episode,
}

/// Kind of a promotional or descriptive image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    #[default]
    Unknown,
    Still,
    Backdrop,
    Poster,
    Avatar,
}

/// An image attached to metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    /// What the image depicts.
    #[serde(rename = "type", default)]
    pub kind: ImageKind,
    /// Local file path when `remote` is false, URL otherwise.
    pub path: String,
    /// Whether `path` is a remote URL.
    pub remote: bool,
    /// Image description.
    #[serde(default)]
    pub description: String,
}

/// A cast member of a movie or series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastMember {
    /// Real name of the cast member.
    pub name: String,
    /// Name of the played character.
    pub role: String,
    /// Portrait of the cast member, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Image>,
}

/// Attributes shared by every metadata variant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Common {
    /// Title, such as "Bocchi the Rock!".
    pub title: String,
    /// Title as in the original release, such as "ぼっち・ざ・ろっく！".
    pub original_title: String,
    /// Plot overview.
    #[serde(default)]
    pub overview: String,
    /// Date of release.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<NaiveDate>,
    /// Average rating, normalized into `[0, 1]`.
    #[serde(default)]
    pub vote_rating: f32,
    /// Promotional images.
    #[serde(default)]
    pub images: Vec<Image>,
}

/// Metadata of a movie or a series.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MovieOrSeries {
    #[serde(flatten)]
    pub common: Common,
    /// Genre names.
    #[serde(default)]
    pub genres: Vec<String>,
    /// Cast members.
    #[serde(default)]
    pub cast: Vec<CastMember>,
    /// BCP-47 tags of the languages spoken.
    #[serde(default)]
    pub languages: Vec<String>,
    /// Region codes of the producing countries.
    #[serde(default)]
    pub countries: Vec<String>,
}

/// Metadata of a single series episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    #[serde(flatten)]
    pub common: Common,
    /// The series this episode belongs to.
    pub series: MovieOrSeries,
    /// Season number.
    pub season: u32,
    /// Episode number within the season.
    pub episode: u32,
}

/// A media metadata object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Metadata {
    Unknown(Common),
    Movie(MovieOrSeries),
    Series(MovieOrSeries),
    Episode(Episode),
}

impl Metadata {
    /// The discriminator of this metadata.
    pub fn kind(&self) -> Kind {
        match self {
            Metadata::Unknown(_) => Kind::Unknown,
            Metadata::Movie(_) => Kind::Movie,
            Metadata::Series(_) => Kind::Series,
            Metadata::Episode(_) => Kind::Episode,
        }
    }

    /// The attributes shared by all variants.
    pub fn common(&self) -> &Common {
        match self {
            Metadata::Unknown(c) => c,
            Metadata::Movie(m) | Metadata::Series(m) => &m.common,
            Metadata::Episode(e) => &e.common,
        }
    }

    /// The title of this metadata.
    pub fn title(&self) -> &str {
        &self.common().title
    }
}

/// A search query for a movie or a series episode.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Query {
    /// Free-text search string.
    pub text: String,
    /// The kind of metadata to search for; [`Kind::Unknown`] searches all.
    #[serde(rename = "type", default)]
    pub kind: Kind,
    /// Season number of the wanted episode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    /// Episode number of the wanted episode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<u32>,
}

impl Query {
    /// The `(season, episode)` pair, if this is an episode query.
    pub fn episode_pair(&self) -> Option<(u32, u32)> {
        self.season.zip(self.episode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_episode() -> Metadata {
        Metadata::Episode(Episode {
            common: Common {
                title: "S06E09".into(),
                original_title: "S06E09".into(),
                vote_rating: 0.87,
                ..Common::default()
            },
            series: MovieOrSeries {
                common: Common {
                    title: "Chicago Med".into(),
                    original_title: "Chicago Med".into(),
                    ..Common::default()
                },
                genres: vec!["Drama".into()],
                ..MovieOrSeries::default()
            },
            season: 6,
            episode: 9,
        })
    }

    #[test]
    fn tagged_roundtrip() {
        let meta = sample_episode();
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["type"], "episode");
        assert_eq!(json["season"], 6);
        assert_eq!(json["series"]["title"], "Chicago Med");

        let back: Metadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
        assert_eq!(back.kind(), Kind::Episode);
    }

    #[test]
    fn unknown_tag() {
        let meta = Metadata::Unknown(Common {
            title: "notes".into(),
            original_title: "notes".into(),
            ..Common::default()
        });
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"type\":\"unknown\""));
    }

    #[test]
    fn query_episode_pair() {
        let q = Query {
            text: "chicago med".into(),
            kind: Kind::Episode,
            season: Some(6),
            episode: Some(9),
        };
        assert_eq!(q.episode_pair(), Some((6, 9)));

        let q = Query::default();
        assert_eq!(q.episode_pair(), None);
    }
}
