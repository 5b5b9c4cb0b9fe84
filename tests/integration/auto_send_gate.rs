use crate::common::{cleanup_db, open_db, temp_db_path};
use hostdesk::autosend::AutoSendGate;

fn keys(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_threshold_walkthrough() {
    let db_path = temp_db_path();
    let db = open_db(&db_path);
    let gate = AutoSendGate::default();

    // Four clean approvals: below the minimum total, not yet eligible.
    {
        let mut conn = db.conn();
        for _ in 0..4 {
            gate.record_approved(&mut conn, "P", &keys(&["CHECKIN_INFO"]))
                .unwrap();
        }
        let stats = gate.get(&conn, "P", "CHECKIN_INFO").unwrap();
        assert_eq!(stats.total_count, 4);
        assert_eq!(stats.approved_count, 4);
        assert!(!stats.eligible);
    }

    // Fifth approval crosses the line: total=5, rate=1.0.
    {
        let mut conn = db.conn();
        gate.record_approved(&mut conn, "P", &keys(&["CHECKIN_INFO"]))
            .unwrap();
        let stats = gate.get(&conn, "P", "CHECKIN_INFO").unwrap();
        assert_eq!(stats.total_count, 5);
        assert!((stats.approval_rate - 1.0).abs() < 1e-9);
        assert!(stats.eligible);
        assert!(gate.eligible(&conn, "P", &keys(&["CHECKIN_INFO"])));
    }

    // One edit: total=6, rate=5/6, still eligible.
    {
        let mut conn = db.conn();
        gate.record_edited(&mut conn, "P", &keys(&["CHECKIN_INFO"]))
            .unwrap();
        let stats = gate.get(&conn, "P", "CHECKIN_INFO").unwrap();
        assert_eq!(stats.total_count, 6);
        assert_eq!(stats.edited_count, 1);
        assert!((stats.approval_rate - 5.0 / 6.0).abs() < 1e-9);
        assert!(stats.eligible);
    }

    // A second edit: rate=5/7 drops below 0.8, no longer eligible.
    {
        let mut conn = db.conn();
        gate.record_edited(&mut conn, "P", &keys(&["CHECKIN_INFO"]))
            .unwrap();
        let stats = gate.get(&conn, "P", "CHECKIN_INFO").unwrap();
        assert_eq!(stats.total_count, 7);
        assert!((stats.approval_rate - 5.0 / 7.0).abs() < 1e-9);
        assert!(!stats.eligible);
        assert!(!gate.eligible(&conn, "P", &keys(&["CHECKIN_INFO"])));
    }

    drop(db);
    cleanup_db(&db_path);
}

#[test]
fn test_rate_monotonicity() {
    let db_path = temp_db_path();
    let db = open_db(&db_path);
    let gate = AutoSendGate::default();

    let mut last_rate = {
        let mut conn = db.conn();
        gate.record_edited(&mut conn, "P", &keys(&["K"])).unwrap();
        gate.get(&conn, "P", "K").unwrap().approval_rate
    };

    // record_approved never decreases the rate; record_edited never
    // increases it.
    for approved in [true, false, true, true, false, true] {
        let mut conn = db.conn();
        if approved {
            gate.record_approved(&mut conn, "P", &keys(&["K"])).unwrap();
            let rate = gate.get(&conn, "P", "K").unwrap().approval_rate;
            assert!(rate >= last_rate - 1e-12);
            last_rate = rate;
        } else {
            gate.record_edited(&mut conn, "P", &keys(&["K"])).unwrap();
            let rate = gate.get(&conn, "P", "K").unwrap().approval_rate;
            assert!(rate <= last_rate + 1e-12);
            last_rate = rate;
        }
        let stats = gate.get(&conn, "P", "K").unwrap();
        assert!((0.0..=1.0).contains(&stats.approval_rate));
        assert_eq!(
            stats.eligible,
            stats.total_count >= 5 && stats.approval_rate >= 0.8
        );
    }

    drop(db);
    cleanup_db(&db_path);
}

#[test]
fn test_all_keys_must_be_eligible() {
    let db_path = temp_db_path();
    let db = open_db(&db_path);
    let gate = AutoSendGate::default();

    {
        let mut conn = db.conn();
        for _ in 0..5 {
            gate.record_approved(&mut conn, "P", &keys(&["CHECKIN_INFO"]))
                .unwrap();
        }
    }

    let conn = db.conn();
    assert!(gate.eligible(&conn, "P", &keys(&["CHECKIN_INFO"])));
    // A second key with no stats at all blocks the combination.
    assert!(!gate.eligible(&conn, "P", &keys(&["CHECKIN_INFO", "WIFI_INFO"])));
    // No keys is never eligible.
    assert!(!gate.eligible(&conn, "P", &[]));
    // Another property's history does not transfer.
    assert!(!gate.eligible(&conn, "Q", &keys(&["CHECKIN_INFO"])));

    drop(conn);
    drop(db);
    cleanup_db(&db_path);
}

#[test]
fn test_multiple_keys_update_together() {
    let db_path = temp_db_path();
    let db = open_db(&db_path);
    let gate = AutoSendGate::default();

    {
        let mut conn = db.conn();
        gate.record_approved(&mut conn, "P", &keys(&["CHECKIN_INFO", "HOUSE_RULES"]))
            .unwrap();
    }

    let conn = db.conn();
    assert_eq!(gate.get(&conn, "P", "CHECKIN_INFO").unwrap().total_count, 1);
    assert_eq!(gate.get(&conn, "P", "HOUSE_RULES").unwrap().total_count, 1);

    drop(conn);
    drop(db);
    cleanup_db(&db_path);
}
