use zipsa_core::filter::{Field, Filter};
use zipsa_core::traits::SparseSearcher;
use zipsa_core::types::Document;
use zipsa_core::RetrievalError;
use zipsa_text::{SparseIndex, TantivySparseSearcher};

const TRAITS: &[&str] = &["hypoallergenic", "shedding_level", "energy_level"];

fn corpus() -> Vec<Document> {
    let mut allergy = Document::new("allergy", "고양이 사료 알레르기 상담").with_specialist("Physician").with_category("Health").with_trait("hypoallergenic", 1);
    allergy.tokenized_text = "고양이 사료 알레르기 상담".into();
    allergy.title = Some("사료 알레르기".into());
    let mut shedding = Document::new("shedding", "고양이 털빠짐 관리").with_specialist("Groomer").with_trait("shedding_level", 4);
    shedding.tokenized_text = "고양이 털빠짐 관리".into();
    let mut puppy = Document::new("puppy", "강아지 사료").with_specialist("Physician");
    puppy.tokenized_text = "강아지 사료".into();
    let mut plain = Document::new("plain", "고양이 사료 급여량");
    plain.tokenized_text = "고양이 사료 급여량".into();
    vec![allergy, shedding, puppy, plain]
}

fn indexed() -> (SparseIndex, TantivySparseSearcher) {
    let index = SparseIndex::in_memory(TRAITS).expect("index");
    let mut writer = index.writer().expect("writer");
    writer.upsert_all(&corpus()).expect("upsert");
    writer.commit().expect("commit");
    let searcher = index.searcher().expect("searcher");
    (index, searcher)
}

fn ids(docs: &[Document]) -> Vec<&str> {
    let mut ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
    ids.sort_unstable();
    ids
}

#[tokio::test]
async fn keyword_search_matches_any_query_token() {
    let (_index, searcher) = indexed();
    let hits = searcher.search("사료", &Filter::default(), 10).await.expect("search");
    assert_eq!(ids(&hits), vec!["allergy", "plain", "puppy"]);
}

#[tokio::test]
async fn denser_matches_rank_first() {
    let (_index, searcher) = indexed();
    let hits = searcher.search("알레르기 상담", &Filter::default(), 10).await.expect("search");
    assert_eq!(hits[0].id, "allergy");
}

#[tokio::test]
async fn stored_fields_come_back_intact() {
    let (_index, searcher) = indexed();
    let hits = searcher.search("알레르기", &Filter::default(), 10).await.expect("search");
    let doc = &hits[0];
    assert_eq!(doc.title.as_deref(), Some("사료 알레르기"));
    assert_eq!(doc.raw_text, "고양이 사료 알레르기 상담");
    assert!(doc.specialists.contains("Physician"));
    assert!(doc.categories.contains("Health"));
    assert_eq!(doc.trait_value("hypoallergenic"), 1);
    assert_eq!(doc.trait_value("energy_level"), 0);
    assert!(doc.embedding.is_empty());
}

#[tokio::test]
async fn specialist_filter_is_a_hard_constraint() {
    let (_index, searcher) = indexed();
    let filter = Filter::equals_text(Field::Specialists, "Physician");
    let hits = searcher.search("고양이 사료", &filter, 10).await.expect("search");
    assert_eq!(ids(&hits), vec!["allergy", "puppy"]);
}

#[tokio::test]
async fn unset_traits_never_satisfy_ranges() {
    let (_index, searcher) = indexed();
    let filter = Filter::trait_range("shedding_level", None, Some(5));
    let hits = searcher.search("고양이", &filter, 10).await.expect("search");
    assert_eq!(ids(&hits), vec!["shedding"]);

    let filter = Filter::trait_eq("hypoallergenic", 1);
    let hits = searcher.search("고양이", &filter, 10).await.expect("search");
    assert_eq!(ids(&hits), vec!["allergy"]);

    let filter = Filter::trait_eq("hypoallergenic", 0);
    let hits = searcher.search("고양이", &filter, 10).await.expect("search");
    assert_eq!(ids(&hits), vec!["plain", "shedding"]);
}

#[tokio::test]
async fn undeclared_trait_is_an_invalid_filter() {
    let (_index, searcher) = indexed();
    let filter = Filter::trait_eq("wingspan", 2);
    let err = searcher.search("고양이", &filter, 10).await.expect_err("unknown trait");
    assert!(matches!(err, RetrievalError::InvalidFilter(_)));
}

#[tokio::test]
async fn empty_query_and_zero_limit_return_nothing() {
    let (_index, searcher) = indexed();
    assert!(searcher.search("   ", &Filter::default(), 10).await.expect("blank").is_empty());
    assert!(searcher.search("사료", &Filter::default(), 0).await.expect("zero").is_empty());
}

#[tokio::test]
async fn upsert_replaces_previous_version() {
    let (index, _searcher) = indexed();
    let mut writer = index.writer().expect("writer");
    let mut changed = Document::new("allergy", "강아지 산책");
    changed.tokenized_text = "강아지 산책".into();
    writer.upsert(&changed).expect("upsert");
    writer.commit().expect("commit");

    let searcher = index.searcher().expect("searcher");
    assert!(searcher.search("알레르기", &Filter::default(), 10).await.expect("old").is_empty());
    let hits = searcher.search("산책", &Filter::default(), 10).await.expect("new");
    assert_eq!(ids(&hits), vec!["allergy"]);
}

#[tokio::test]
async fn index_persists_on_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tantivy");
    {
        let index = SparseIndex::create(&path, TRAITS).expect("create");
        let mut writer = index.writer().expect("writer");
        writer.upsert_all(&corpus()).expect("upsert");
        writer.commit().expect("commit");
    }
    let reopened = SparseIndex::open_or_create(&path, TRAITS).expect("open");
    assert_eq!(reopened.fields().traits.len(), TRAITS.len());
    let hits = reopened.searcher().expect("searcher").search("털빠짐", &Filter::default(), 10).await.expect("search");
    assert_eq!(ids(&hits), vec!["shedding"]);
}
