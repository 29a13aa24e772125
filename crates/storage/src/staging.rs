//! Key layout of staged receipt batches:
//! `transactions/{user_id}/{batch_id}/{image_id}.{ext}`.

use std::collections::BTreeSet;

use crate::{ObjectStore, ResultStorage, StorageError};

const ROOT: &str = "transactions";

fn segment<'a>(value: &'a str, label: &str) -> ResultStorage<&'a str> {
    if value.is_empty() || value.contains('/') || value == "." || value == ".." {
        return Err(StorageError::InvalidKey(format!("{label}: {value}")));
    }
    Ok(value)
}

pub fn user_prefix(user_id: &str) -> ResultStorage<String> {
    Ok(format!("{ROOT}/{}", segment(user_id, "user id")?))
}

pub fn batch_prefix(user_id: &str, batch_id: &str) -> ResultStorage<String> {
    Ok(format!(
        "{}/{}",
        user_prefix(user_id)?,
        segment(batch_id, "batch id")?
    ))
}

pub fn image_key(user_id: &str, batch_id: &str, image_id: &str, ext: &str) -> ResultStorage<String> {
    Ok(format!(
        "{}/{}.{}",
        batch_prefix(user_id, batch_id)?,
        segment(image_id, "image id")?,
        segment(ext, "extension")?
    ))
}

/// Batch ids that still have staged objects for `user_id`.
pub async fn list_batches(store: &dyn ObjectStore, user_id: &str) -> ResultStorage<Vec<String>> {
    let prefix = format!("{}/", user_prefix(user_id)?);
    let batches: BTreeSet<String> = store
        .list(&prefix)
        .await?
        .iter()
        .filter_map(|key| key.strip_prefix(&prefix))
        .filter_map(|rest| rest.split_once('/'))
        .map(|(batch, _)| batch.to_string())
        .collect();
    Ok(batches.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    #[test]
    fn layout() {
        assert_eq!(
            image_key("alice", "b1", "i1", "png").unwrap(),
            "transactions/alice/b1/i1.png"
        );
        assert_eq!(batch_prefix("alice", "b1").unwrap(), "transactions/alice/b1");
        assert!(batch_prefix("../etc", "b1").is_err());
        assert!(image_key("alice", "", "i1", "png").is_err());
    }

    #[tokio::test]
    async fn batches_per_user() {
        let store = MemoryStore::new();
        for key in [
            "transactions/alice/b2/1.png",
            "transactions/alice/b1/1.png",
            "transactions/alice/b1/2.png",
            "transactions/bob/b3/1.png",
        ] {
            store.put(key, vec![0], "image/png").await.unwrap();
        }
        assert_eq!(list_batches(&store, "alice").await.unwrap(), vec!["b1", "b2"]);
        assert!(list_batches(&store, "carol").await.unwrap().is_empty());
    }
}
