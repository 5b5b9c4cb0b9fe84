use crate::common::{FakeEmbedder, cleanup_db, open_db, temp_db_path};
use hostdesk::embeddings::EmbeddingStore;

#[rocket::async_test]
async fn test_store_and_search_by_topic() {
    let db_path = temp_db_path();
    let db = open_db(&db_path);
    let store = EmbeddingStore::default();
    let embedder = FakeEmbedder;

    store
        .store(&db, &embedder, "체크인 몇 시부터 가능한가요?", "체크인은 14:00부터 가능합니다.", Some("P1"), false, None, None)
        .await
        .unwrap();
    store
        .store(&db, &embedder, "주차 가능한가요?", "건물 뒤편에 주차하실 수 있어요.", Some("P1"), false, None, None)
        .await
        .unwrap();

    let results = store
        .search(&db, &embedder, "체크인 시간 알려주세요", None, 3)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].final_answer.contains("14:00"));
    assert!(results[0].similarity > 0.9);

    drop(db);
    cleanup_db(&db_path);
}

#[rocket::async_test]
async fn test_below_threshold_dropped() {
    let db_path = temp_db_path();
    let db = open_db(&db_path);
    let store = EmbeddingStore::default();
    let embedder = FakeEmbedder;

    store
        .store(&db, &embedder, "바베큐 가능한가요?", "바베큐는 마당에서 가능합니다.", None, false, None, None)
        .await
        .unwrap();

    // Disjoint topic: cosine similarity is zero, below any threshold.
    let results = store
        .search(&db, &embedder, "수건 몇 개 있어요?", None, 3)
        .await
        .unwrap();
    assert!(results.is_empty());

    drop(db);
    cleanup_db(&db_path);
}

#[rocket::async_test]
async fn test_same_property_ranks_first() {
    let db_path = temp_db_path();
    let db = open_db(&db_path);
    let store = EmbeddingStore::default();
    let embedder = FakeEmbedder;

    store
        .store(&db, &embedder, "수건 더 받을 수 있나요?", "다른 숙소 답변", Some("OTHER"), false, None, None)
        .await
        .unwrap();
    store
        .store(&db, &embedder, "수건 추가 가능한가요?", "우리 숙소 답변", Some("MINE"), false, None, None)
        .await
        .unwrap();

    let results = store
        .search(&db, &embedder, "수건 몇 개 있어요?", Some("MINE"), 3)
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].property_code.as_deref(), Some("MINE"));
    assert_eq!(results[0].final_answer, "우리 숙소 답변");

    drop(db);
    cleanup_db(&db_path);
}

#[rocket::async_test]
async fn test_few_shot_block_format() {
    let db_path = temp_db_path();
    let db = open_db(&db_path);
    let store = EmbeddingStore::default();
    let embedder = FakeEmbedder;

    store
        .store(&db, &embedder, "와이파이 비밀번호 알려주세요", "와이파이 비밀번호는 welcome123 입니다.", Some("P1"), false, None, None)
        .await
        .unwrap();

    let block = store
        .few_shot_block(&db, &embedder, "와이파이 어떻게 쓰나요?", Some("P1"), 3)
        .await
        .unwrap()
        .expect("expected a few-shot block");
    assert!(block.contains("Guest asked: 와이파이 비밀번호 알려주세요"));
    assert!(block.contains("Answer: 와이파이 비밀번호는 welcome123 입니다."));

    // Nothing similar: no block at all.
    let none = store
        .few_shot_block(&db, &embedder, "침대 몇 개인가요?", Some("P1"), 3)
        .await
        .unwrap();
    assert!(none.is_none());

    drop(db);
    cleanup_db(&db_path);
}
