mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serial_test::serial;
use tokio::sync::mpsc;

use sipua_sip_core::prelude::*;
use sipua_sip_transport::{bind_udp, Transport, TransportEvent, TransportType};
use sipua_transaction_core::prelude::*;

use common::*;

#[tokio::test]
async fn test_duplicate_branch_is_rejected() {
    let (manager, _stray, _transport, _sent_rx) = manager(None);
    let (user, _events) = ChannelTransactionUser::channel(16);
    let user = Arc::new(user);

    manager
        .create_client_transaction(invite_request("dup"), remote_addr(), TransportType::Udp, Some("z9hG4bK-dup"), user.clone())
        .await
        .unwrap();

    let second = manager
        .create_client_transaction(invite_request("dup"), remote_addr(), TransportType::Udp, Some("z9hG4bK-dup"), user.clone())
        .await;
    assert!(matches!(second, Err(Error::TransactionExists(key)) if key.id() == "z9hG4bK-dup|INVITE"));

    // Same branch, different method is a different transaction
    manager
        .create_client_transaction(
            non_invite_request(Method::Cancel, "dup"),
            remote_addr(),
            TransportType::Udp,
            Some("z9hG4bK-dup"),
            user,
        )
        .await
        .unwrap();
    assert_eq!(manager.client_transaction_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creation_registers_once() {
    let (manager, _stray, _transport, _sent_rx) = manager(None);
    let (user, _events) = ChannelTransactionUser::channel(16);
    let user: Arc<dyn ClientTransactionUser> = Arc::new(user);

    let attempts = (0..16).map(|_| {
        let manager = manager.clone();
        let user = user.clone();
        tokio::spawn(async move {
            manager
                .create_client_transaction(
                    non_invite_request(Method::Options, "race"),
                    remote_addr(),
                    TransportType::Udp,
                    Some("z9hG4bK-race"),
                    user,
                )
                .await
        })
    });

    let results = join_all(attempts).await;
    let created = results.iter().filter(|r| matches!(r, Ok(Ok(_)))).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Ok(Err(Error::TransactionExists(_)))))
        .count();
    assert_eq!(created, 1);
    assert_eq!(rejected, 15);
    assert_eq!(manager.client_transaction_count(), 1);
}

#[tokio::test]
async fn test_ack_cannot_start_a_client_transaction() {
    let (manager, _stray, _transport, _sent_rx) = manager(None);
    let (user, _events) = ChannelTransactionUser::channel(16);

    let result = manager
        .create_client_transaction(
            non_invite_request(Method::Ack, "ack"),
            remote_addr(),
            TransportType::Udp,
            None,
            Arc::new(user),
        )
        .await;
    assert!(matches!(result, Err(Error::UnsupportedMethod(Method::Ack))));
    assert_eq!(manager.client_transaction_count(), 0);
}

#[tokio::test]
async fn test_branch_hint_without_cookie_is_replaced() {
    let (manager, _stray, _transport, _sent_rx) = manager(None);
    let (user, _events) = ChannelTransactionUser::channel(16);
    let user = Arc::new(user);

    let tx = manager
        .create_client_transaction(invite_request("hint"), remote_addr(), TransportType::Udp, Some("abc123"), user.clone())
        .await
        .unwrap();
    assert!(tx.key().branch().starts_with(BRANCH_MAGIC_COOKIE));
    assert_ne!(tx.key().branch(), "abc123");

    let tx = manager
        .create_client_transaction(invite_request("hint"), remote_addr(), TransportType::Udp, Some(""), user)
        .await
        .unwrap();
    assert!(tx.key().branch().starts_with(BRANCH_MAGIC_COOKIE));
    assert_eq!(tx.request().header_values(header::VIA).count(), 1);
}

#[tokio::test]
async fn test_existing_via_with_same_branch_is_kept() {
    let (manager, _stray, _transport, _sent_rx) = manager(None);
    let (user, _events) = ChannelTransactionUser::channel(16);

    let mut request = invite_request("keep-via");
    request.push_top_via(&Via::new("UDP", "10.0.0.1", Some(5060)).with_branch("z9hG4bK-mine"));

    let tx = manager
        .create_client_transaction(request, remote_addr(), TransportType::Udp, Some("z9hG4bK-mine"), Arc::new(user))
        .await
        .unwrap();
    assert_eq!(tx.request().header_values(header::VIA).count(), 1);
    assert_eq!(tx.request().top_via().unwrap().host, "10.0.0.1");
}

#[tokio::test]
async fn test_lookup_by_call_id_and_method() {
    let (manager, _stray, _transport, _sent_rx) = manager(None);
    let (user, _events) = ChannelTransactionUser::channel(16);
    let user = Arc::new(user);

    for _ in 0..2 {
        manager
            .create_client_transaction(invite_request("shared"), remote_addr(), TransportType::Udp, None, user.clone())
            .await
            .unwrap();
    }
    manager
        .create_client_transaction(
            non_invite_request(Method::Bye, "shared"),
            remote_addr(),
            TransportType::Udp,
            None,
            user.clone(),
        )
        .await
        .unwrap();
    manager
        .create_client_transaction(invite_request("other"), remote_addr(), TransportType::Udp, None, user)
        .await
        .unwrap();

    let invites = manager.get_client_transactions_from_call_id("shared", &Method::Invite);
    assert_eq!(invites.len(), 2);
    assert!(invites.iter().all(|tx| tx.call_id() == Some("shared")));
    assert_eq!(manager.get_client_transactions_from_call_id("shared", &Method::Bye).len(), 1);
    assert!(manager.get_client_transactions_from_call_id("missing", &Method::Invite).is_empty());

    let (clients, servers) = manager.active_transactions();
    assert_eq!(clients.len(), 4);
    assert!(servers.is_empty());
}

#[tokio::test]
async fn test_outbound_proxy_route_is_added() {
    let config = TransactionManagerConfig::default().with_outbound_proxy("sip:proxy.example.com");
    let (manager, _stray, _transport, _sent_rx) = manager(Some(config));
    let (user, _events) = ChannelTransactionUser::channel(16);
    let user = Arc::new(user);

    let tx = manager
        .create_client_transaction(invite_request("proxy"), remote_addr(), TransportType::Udp, None, user.clone())
        .await
        .unwrap();
    assert_eq!(tx.request().header(header::ROUTE), Some("<sip:proxy.example.com;lr>"));

    let routed = RequestBuilder::new(Method::Options, "sip:bob@example.com")
        .route("<sip:edge.example.com;lr>")
        .call_id("proxy-2")
        .cseq(1)
        .build();
    let tx = manager
        .create_client_transaction(routed, remote_addr(), TransportType::Udp, None, user)
        .await
        .unwrap();
    let routes: Vec<&str> = tx.request().header_values(header::ROUTE).collect();
    assert_eq!(routes, vec!["<sip:edge.example.com;lr>"]);
}

#[tokio::test]
async fn test_zero_capacity_config_is_rejected() {
    let (transport, _sent_rx) = MockTransport::new();
    let config = TransactionManagerConfig {
        event_capacity: 0,
        ..Default::default()
    };
    assert!(matches!(
        TransactionManager::new_sync(transport, Some(config)),
        Err(Error::Config(_))
    ));
}

#[tokio::test]
async fn test_message_loop_forwards_stray_traffic() {
    init_tracing();
    let (transport, _sent_rx) = MockTransport::new();
    let (transport_tx, transport_rx) = mpsc::channel(16);
    let (manager, mut stray) = TransactionManager::new(transport, transport_rx, None).await.unwrap();

    let mut request = inbound_request(Method::Invite, "z9hG4bK-new");
    request.set_header(header::VIA, "SIP/2.0/UDP client.invalid:5070;branch=z9hG4bK-new;rport");
    transport_tx
        .send(TransportEvent::MessageReceived {
            message: request.into(),
            source: "192.0.2.10:40000".parse().unwrap(),
            destination: local_addr(),
        })
        .await
        .unwrap();

    match next_event(&mut stray).await {
        TransactionEvent::StrayRequest { request, source } => {
            let via = request.top_via().unwrap();
            assert_eq!(via.received(), Some("192.0.2.10"));
            assert_eq!(via.rport(), Some(Some(40000)));
            assert_eq!(source.port(), 40000);
        }
        other => panic!("unexpected event {:?}", other),
    }

    transport_tx
        .send(TransportEvent::Error { error: "bad datagram".to_string() })
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut stray).await,
        TransactionEvent::TransportFailure { error } if error == "bad datagram"
    ));

    transport_tx.send(TransportEvent::Closed).await.unwrap();
    assert!(matches!(next_event(&mut stray).await, TransactionEvent::TransportClosed));

    manager.shutdown().await;
}

/// Stray traffic nobody reads must not hold up responses for live
/// transactions.
#[tokio::test(start_paused = true)]
async fn test_unread_stray_events_do_not_block_routing() {
    init_tracing();
    let (transport, mut sent_rx) = MockTransport::new();
    let (transport_tx, transport_rx) = mpsc::channel(16);
    let config = TransactionManagerConfig {
        event_capacity: 1,
        ..Default::default()
    };
    let (manager, _stray) = TransactionManager::new(transport, transport_rx, Some(config)).await.unwrap();

    let (user, mut events) = ChannelTransactionUser::channel(16);
    let tx = manager
        .create_client_transaction(invite_request("backlog"), remote_addr(), TransportType::Udp, None, Arc::new(user))
        .await
        .unwrap();
    tx.start().await.unwrap();
    next_sent(&mut sent_rx).await;

    for branch in ["z9hG4bK-stray-1", "z9hG4bK-stray-2", "z9hG4bK-stray-3"] {
        transport_tx.send(received(inbound_request(Method::Options, branch))).await.unwrap();
    }
    transport_tx
        .send(received(response_to(tx.request(), StatusCode::Ringing)))
        .await
        .unwrap();

    match next_event(&mut events).await {
        TransactionEvent::ProvisionalResponse { transaction_id, response } => {
            assert_eq!(&transaction_id, tx.key());
            assert_eq!(response.status, StatusCode::Ringing);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(tx.state(), TransactionState::Proceeding);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_terminates_live_transactions() {
    let (manager, _stray, _transport, mut sent_rx) = manager(None);
    let (user, mut events) = ChannelTransactionUser::channel(16);
    let user = Arc::new(user);

    let client = manager
        .create_client_transaction(invite_request("shutdown"), remote_addr(), TransportType::Udp, None, user.clone())
        .await
        .unwrap();
    client.start().await.unwrap();
    next_sent(&mut sent_rx).await;

    let options = inbound_request(Method::Options, "z9hG4bK-shutdown");
    manager
        .create_server_transaction(response_to(&options, StatusCode::Ok), remote_addr(), TransportType::Udp, user, options)
        .await
        .unwrap();

    manager.shutdown().await;
    settle().await;

    assert_eq!(manager.client_transaction_count(), 0);
    assert_eq!(manager.server_transaction_count(), 0);
    assert_eq!(client.state(), TransactionState::Terminated);
    assert!(events.try_recv().is_err());
}

/// OPTIONS round trip between two managers over real UDP sockets.
#[tokio::test]
#[serial]
async fn test_options_exchange_over_udp() {
    init_tracing();
    let (uac_transport, uac_rx) = bind_udp("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let (uas_transport, uas_rx) = bind_udp("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let uas_addr = uas_transport.local_addr().unwrap();

    let (uac, _uac_stray) = TransactionManager::new(Arc::new(uac_transport), uac_rx, None).await.unwrap();
    let (uas, mut uas_stray) = TransactionManager::new(Arc::new(uas_transport), uas_rx, None).await.unwrap();

    let (uac_user, mut uac_events) = ChannelTransactionUser::channel(16);
    let tx = uac
        .create_client_transaction(
            non_invite_request(Method::Options, "udp-options"),
            uas_addr,
            TransportType::Udp,
            None,
            Arc::new(uac_user),
        )
        .await
        .unwrap();
    tx.start().await.unwrap();

    let (request, source) = match tokio::time::timeout(Duration::from_secs(5), uas_stray.recv()).await {
        Ok(Some(TransactionEvent::StrayRequest { request, source })) => (request, source),
        other => panic!("expected the OPTIONS request, got {:?}", other),
    };
    assert_eq!(request.method, Method::Options);

    let (uas_user, _uas_events) = ChannelTransactionUser::channel(16);
    let server = uas
        .create_server_transaction(
            ResponseBuilder::from_request(&request, StatusCode::Ok).to_tag("uas").build(),
            source,
            TransportType::Udp,
            Arc::new(uas_user),
            request,
        )
        .await
        .unwrap();
    server.start().await.unwrap();

    match tokio::time::timeout(Duration::from_secs(5), uac_events.recv()).await {
        Ok(Some(TransactionEvent::SuccessResponse { transaction_id, response })) => {
            assert_eq!(&transaction_id, tx.key());
            assert_eq!(response.status, StatusCode::Ok);
        }
        other => panic!("expected 200 OK, got {:?}", other),
    }

    uac.shutdown().await;
    uas.shutdown().await;
}
