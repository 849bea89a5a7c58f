use async_trait::async_trait;
use bson::{Bson, Uuid, doc};
use docshape::{memory::InMemoryStore, prelude::*};

async fn store_with_projects(count: usize) -> DocumentStore<InMemoryStore> {
    let store = DocumentStore::new(InMemoryStore::new());
    let projects = store.collection("projects");

    for i in 0..count {
        projects
            .insert(doc! { "name": format!("Project {i}"), "rank": (count - i) as i32 })
            .await
            .unwrap();
    }

    store
}

fn ids(page: &PageResult<bson::Document>) -> Vec<Bson> {
    page.results()
        .iter()
        .filter_map(|doc| doc.get("_id").cloned())
        .collect()
}

fn names(page: &PageResult<bson::Document>) -> Vec<String> {
    page.results()
        .iter()
        .filter_map(|doc| doc.get_str("name").ok().map(str::to_string))
        .collect()
}

#[tokio::test]
async fn limits_the_number_of_results() {
    let store = store_with_projects(5).await;
    let page = store
        .collection("projects")
        .paginate(None, &PageOptions::builder().limit(2).build())
        .await
        .unwrap();

    assert_eq!(page.results().len(), 2);
    assert_eq!(page.page(), 1);
    assert_eq!(page.limit(), 2);
}

#[tokio::test]
async fn second_page_reports_totals() {
    let store = store_with_projects(5).await;
    let page = store
        .collection("projects")
        .paginate(None, &PageOptions::builder().limit(2).page(2).build())
        .await
        .unwrap();

    assert_eq!(page.results().len(), 2);
    assert_eq!(page.page(), 2);
    assert_eq!(page.total_pages(), 3);
    assert_eq!(page.total_results(), 5);
}

#[tokio::test]
async fn consecutive_pages_are_disjoint() {
    let store = store_with_projects(5).await;
    let projects = store.collection("projects");

    let mut seen = Vec::new();
    for page in 1..=3 {
        let result = projects
            .paginate(None, &PageOptions::builder().limit(2).page(page).build())
            .await
            .unwrap();
        seen.extend(ids(&result));
    }

    assert_eq!(seen.len(), 5);
    for (i, id) in seen.iter().enumerate() {
        assert!(!seen[i + 1..].contains(id));
    }
}

#[tokio::test]
async fn defaults_apply_without_options() {
    let store = store_with_projects(12).await;
    let page = store
        .collection("projects")
        .paginate(None, &PageOptions::default())
        .await
        .unwrap();

    assert_eq!(page.limit(), 10);
    assert_eq!(page.page(), 1);
    assert_eq!(page.results().len(), 10);
    assert_eq!(page.total_pages(), 2);
}

#[tokio::test]
async fn schema_default_limit_is_used() {
    let mut store = store_with_projects(5).await;
    store.register(Schema::builder("projects").default_limit(3).build());

    let page = store
        .collection("projects")
        .paginate(None, &PageOptions::default())
        .await
        .unwrap();

    assert_eq!(page.limit(), 3);
    assert_eq!(page.total_pages(), 2);
}

#[tokio::test]
async fn page_beyond_range_is_empty_but_counted() {
    let store = store_with_projects(5).await;
    let page = store
        .collection("projects")
        .paginate(None, &PageOptions::builder().limit(2).page(9).build())
        .await
        .unwrap();

    assert!(page.results().is_empty());
    assert_eq!(page.page(), 9);
    assert_eq!(page.total_results(), 5);
    assert_eq!(page.total_pages(), 3);
}

#[tokio::test]
async fn limit_larger_than_total_returns_everything() {
    let store = store_with_projects(4).await;
    let page = store
        .collection("projects")
        .paginate(None, &PageOptions::builder().limit(50).build())
        .await
        .unwrap();

    assert_eq!(page.results().len(), 4);
    assert_eq!(page.total_pages(), 1);
}

#[tokio::test]
async fn empty_collection_has_no_pages() {
    let store = DocumentStore::new(InMemoryStore::new());
    let page = store
        .collection("projects")
        .paginate(None, &PageOptions::default())
        .await
        .unwrap();

    assert!(page.results().is_empty());
    assert_eq!(page.total_results(), 0);
    assert_eq!(page.total_pages(), 0);
}

#[tokio::test]
async fn sorts_by_the_given_keys() {
    let store = store_with_projects(4).await;
    let projects = store.collection("projects");

    let ascending = projects
        .paginate(None, &PageOptions::builder().sort_by("rank").build())
        .await
        .unwrap();
    assert_eq!(names(&ascending), ["Project 3", "Project 2", "Project 1", "Project 0"]);

    let descending = projects
        .paginate(None, &PageOptions::builder().sort_by("name:desc").limit(2).build())
        .await
        .unwrap();
    assert_eq!(names(&descending), ["Project 3", "Project 2"]);
}

#[tokio::test]
async fn compound_sort_breaks_ties() {
    let store = DocumentStore::new(InMemoryStore::new());
    let people = store.collection("people");

    for (name, role) in [("b", "user"), ("a", "admin"), ("c", "user"), ("d", "admin")] {
        people.insert(doc! { "name": name, "role": role }).await.unwrap();
    }

    let page = people
        .paginate(None, &PageOptions::builder().sort_by("role,name:desc").build())
        .await
        .unwrap();

    assert_eq!(names(&page), ["d", "a", "c", "b"]);
}

#[tokio::test]
async fn filter_applies_to_results_and_count() {
    let store = store_with_projects(5).await;
    let page = store
        .collection("projects")
        .paginate(Some(Filter::lte("rank", 3)), &PageOptions::builder().limit(2).build())
        .await
        .unwrap();

    assert_eq!(page.total_results(), 3);
    assert_eq!(page.total_pages(), 2);
    assert_eq!(page.results().len(), 2);
}

#[tokio::test]
async fn malformed_options_fall_back_to_defaults() {
    let store = store_with_projects(3).await;
    let options: PageOptions = serde_json::from_value(serde_json::json!({
        "limit": "lots",
        "page": -1,
        "sortBy": "",
    }))
    .unwrap();

    let page = store
        .collection("projects")
        .paginate(None, &options)
        .await
        .unwrap();

    assert_eq!(page.limit(), 10);
    assert_eq!(page.page(), 1);
    assert_eq!(page.results().len(), 3);
}

#[tokio::test]
async fn public_pages_serialize_as_envelope() {
    let store = store_with_projects(3).await;
    let page = store
        .collection("projects")
        .paginate_public(None, &PageOptions::builder().limit(2).build())
        .await
        .unwrap();

    let json = serde_json::to_value(&page).unwrap();

    assert_eq!(json["totalResults"], 3);
    assert_eq!(json["totalPages"], 2);
    assert_eq!(json["limit"], 2);
    assert_eq!(json["page"], 1);

    let first = &json["results"][0];
    assert!(first.get("_id").is_none());
    assert!(first.get("__v").is_none());
    assert!(first["id"].is_string());
}

/// Backend whose reads fail, for checking that store errors reach the caller as-is.
#[derive(Debug, Default)]
struct FailingStore {
    fail_count: bool,
    fail_query: bool,
}

#[async_trait]
impl StoreBackend for FailingStore {
    async fn insert_documents(&self, _: Vec<(Uuid, Bson)>, _: &str) -> DocumentStoreResult<()> {
        Ok(())
    }

    async fn update_documents(&self, _: Vec<(Uuid, Bson)>, _: &str) -> DocumentStoreResult<()> {
        Ok(())
    }

    async fn delete_documents(&self, _: Vec<Uuid>, _: &str) -> DocumentStoreResult<()> {
        Ok(())
    }

    async fn get_documents(&self, _: Vec<Uuid>, _: &str) -> DocumentStoreResult<Vec<Bson>> {
        Ok(Vec::new())
    }

    async fn query_documents(&self, _: Query, _: &str) -> DocumentStoreResult<Vec<Bson>> {
        if self.fail_query {
            return Err(DocumentStoreError::Backend("query failed".to_string()));
        }

        Ok(Vec::new())
    }

    async fn count_documents(&self, _: Option<Expr>, _: &str) -> DocumentStoreResult<u64> {
        if self.fail_count {
            return Err(DocumentStoreError::Backend("count failed".to_string()));
        }

        Ok(0)
    }

    async fn create_collection(&self, _: &str) -> DocumentStoreResult<()> {
        Ok(())
    }

    async fn drop_collection(&self, _: &str) -> DocumentStoreResult<()> {
        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn count_errors_propagate() {
    let store = DocumentStore::new(FailingStore { fail_count: true, ..FailingStore::default() });
    let result = store
        .collection("projects")
        .paginate(None, &PageOptions::default())
        .await;

    assert!(matches!(result, Err(DocumentStoreError::Backend(message)) if message == "count failed"));
}

#[tokio::test]
async fn find_errors_propagate() {
    let store = DocumentStore::new(FailingStore { fail_query: true, ..FailingStore::default() });
    let result = store
        .collection("projects")
        .paginate_public(None, &PageOptions::builder().limit(2).build())
        .await;

    assert!(matches!(result, Err(DocumentStoreError::Backend(message)) if message == "query failed"));
}
