//! 服务层端到端场景：下单 -> 心跳 -> 订阅看到请求 -> 抢单 ->
//! 第二个司机抢单失败 -> 完成 -> 请求从所有订阅消失。

use std::sync::Arc;

use backend::AppState;
use backend::config::Config;
use backend::error::AppError;
use backend::store::{RequestStatus, RideLocation};

fn test_state() -> AppState {
    let config = Config {
        watch_refresh_secs: 1,
        ..Config::default()
    };
    AppState::new(config)
}

fn zocalo() -> RideLocation {
    RideLocation {
        latitude: 19.4326,
        longitude: -99.1332,
        location_name: Some("Centro".into()),
    }
}

#[tokio::test]
async fn full_ride_lifecycle() {
    let state = test_state();

    // 司机在同一位置上报心跳
    state
        .presence
        .publish("driver-1", 19.4326, -99.1332, 1, None)
        .await
        .unwrap();
    assert_eq!(
        state.presence.count_nearby(19.4326, -99.1332).await.unwrap(),
        1
    );

    // 司机开始订阅，乘客下单
    let mut watch = state
        .requests
        .watch_open_requests(19.4326, -99.1332)
        .unwrap();
    let request = state
        .requests
        .submit("client-1".into(), zocalo(), None)
        .await
        .unwrap();

    let mut emission = watch.recv().await.unwrap();
    if emission.is_empty() {
        emission = watch.recv().await.unwrap();
    }
    assert_eq!(emission.len(), 1);
    assert_eq!(emission[0].request_id, request.request_id);

    // 抢单：第一个成功，第二个拿到 RequestAlreadyTaken
    let claimed = state
        .requests
        .accept(&request.request_id, "driver-1")
        .await
        .unwrap();
    assert_eq!(claimed.status, RequestStatus::Claimed);
    assert_eq!(claimed.claimed_by.as_deref(), Some("driver-1"));

    let err = state
        .requests
        .accept(&request.request_id, "driver-2")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::RequestAlreadyTaken(_)));

    // 抢单成功后订阅列表回到空
    assert!(watch.recv().await.unwrap().is_empty());

    // 完成行程，请求进入终态且不再出现在任何 open 视图
    let completed = state.requests.complete(&request.request_id).await.unwrap();
    assert_eq!(completed.status, RequestStatus::Completed);

    let open = state
        .requests
        .open_requests_near(19.4326, -99.1332)
        .await
        .unwrap();
    assert!(open.is_empty());
}

#[tokio::test]
async fn concurrent_accepts_single_winner() {
    let state = test_state();
    let request = state
        .requests
        .submit("client-1".into(), zocalo(), None)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let requests = Arc::clone(&state.requests);
        let request_id = request.request_id.clone();
        handles.push(tokio::spawn(async move {
            requests.accept(&request_id, &format!("driver-{}", i)).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(AppError::RequestAlreadyTaken(_)) => {}
            Err(other) => panic!("预期之外的错误: {:?}", other),
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn rider_count_watch_follows_driver_presence() {
    let state = test_state();
    let mut watch = state.presence.watch_driver_count(19.4326, -99.1332).unwrap();

    state
        .presence
        .publish("driver-1", 19.4326, -99.1332, 1, None)
        .await
        .unwrap();
    let mut count = watch.recv().await.unwrap();
    if count == 0 {
        count = watch.recv().await.unwrap();
    }
    assert_eq!(count, 1);

    // 邻格司机也计入九格统计
    state
        .presence
        .publish("driver-2", 19.4426, -99.1332, 1, None)
        .await
        .unwrap();
    assert_eq!(watch.recv().await.unwrap(), 2);

    state.presence.go_offline("driver-2").await;
    assert_eq!(watch.recv().await.unwrap(), 1);
}
