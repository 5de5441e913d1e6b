//! Publication feed snapshot.

use causerie_shared::types::Publication;

use crate::database::Database;
use crate::error::Result;

const KEY_PUBLICATIONS: &str = "publications";

impl Database {
    /// Replace the cached feed wholesale.
    pub fn save_publications(&self, publications: &[Publication]) -> Result<()> {
        self.put_kv(KEY_PUBLICATIONS, &serde_json::to_string(publications)?)
    }

    /// Last-known feed; empty when nothing has been cached yet.
    pub fn get_publications(&self) -> Result<Vec<Publication>> {
        match self.get_kv(KEY_PUBLICATIONS)? {
            Some(v) => Ok(serde_json::from_str(&v)?),
            None => Ok(Vec::new()),
        }
    }

    /// Prepend one publication to the cached feed.
    pub fn add_publication(&self, publication: &Publication) -> Result<()> {
        let mut publications = self.get_publications()?;
        publications.insert(0, publication.clone());
        self.save_publications(&publications)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causerie_shared::types::User;
    use chrono::Utc;

    fn publication(id: i64) -> Publication {
        Publication {
            id,
            title: format!("titre {id}"),
            content: "contenu".into(),
            image_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            author: User {
                id: 1,
                username: "alice".into(),
                email: "alice@example.com".into(),
                first_name: "Alice".into(),
                last_name: "Doe".into(),
                phone_number: None,
                address: None,
                profile_picture_url: None,
            },
            likes_count: 0,
            comments_count: 0,
            is_liked: false,
        }
    }

    #[test]
    fn feed_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();

        assert!(db.get_publications().unwrap().is_empty());

        db.save_publications(&[publication(1)]).unwrap();
        db.add_publication(&publication(2)).unwrap();

        let feed = db.get_publications().unwrap();
        assert_eq!(feed.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2, 1]);
    }
}
