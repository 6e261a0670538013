use pitstop_core::BusinessId;
use reqwest::StatusCode;
use serde_json::json;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let app = pitstop_api::app::build_app().await;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

async fn post_json(
    client: &reqwest::Client,
    base_url: &str,
    business_id: BusinessId,
    path: &str,
    body: serde_json::Value,
) -> reqwest::Response {
    client
        .post(format!("{base_url}{path}"))
        .header("x-business-id", business_id.to_string())
        .json(&body)
        .send()
        .await
        .unwrap()
}

async fn get_json(
    client: &reqwest::Client,
    base_url: &str,
    business_id: BusinessId,
    path: &str,
) -> reqwest::Response {
    client
        .get(format!("{base_url}{path}"))
        .header("x-business-id", business_id.to_string())
        .send()
        .await
        .unwrap()
}

/// The API is intentionally eventual-consistent (command path vs projection
/// update). Poll briefly until the projection catches up.
async fn get_eventually(
    client: &reqwest::Client,
    base_url: &str,
    business_id: BusinessId,
    path: &str,
) -> serde_json::Value {
    for _ in 0..100 {
        let res = get_json(client, base_url, business_id, path).await;
        if res.status() == StatusCode::OK {
            return res.json().await.unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    panic!("{path} did not become visible in projection within timeout");
}

async fn on_hand_eventually(
    client: &reqwest::Client,
    base_url: &str,
    business_id: BusinessId,
    item_id: &str,
    expected: i64,
) {
    for _ in 0..100 {
        let res = get_json(
            client,
            base_url,
            business_id,
            &format!("/inventory/items/{item_id}"),
        )
        .await;
        if res.status() == StatusCode::OK {
            let body: serde_json::Value = res.json().await.unwrap();
            if body["on_hand"].as_i64() == Some(expected) {
                return;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    panic!("item {item_id} never reached on_hand={expected}");
}

async fn created_id(res: reqwest::Response) -> String {
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_needs_no_business_context() {
    let server = TestServer::spawn().await;
    let res = client()
        .get(format!("{}/health", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn scoped_routes_reject_missing_business_header() {
    let server = TestServer::spawn().await;
    let res = client()
        .get(format!("{}/inventory/items", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn booking_flow_from_stock_to_invoice() {
    let server = TestServer::spawn().await;
    let client = client();
    let business_id = BusinessId::new();
    let base = &server.base_url;

    // Stock an oil filter at 25.00 retail.
    let item_id = created_id(
        post_json(
            &client,
            base,
            business_id,
            "/inventory/items",
            json!({
                "name": "Oil Filter",
                "brand": "Bosch",
                "sku": "OF-3330",
                "retail_price": "25.00",
                "unit": "pcs",
                "reorder_point": 2,
            }),
        )
        .await,
    )
    .await;

    let res = post_json(
        &client,
        base,
        business_id,
        &format!("/inventory/items/{item_id}/receive"),
        json!({ "quantity": 10 }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    on_hand_eventually(&client, base, business_id, &item_id, 10).await;

    // Catalog service at 100.00.
    let service_id = created_id(
        post_json(
            &client,
            base,
            business_id,
            "/services",
            json!({ "name": "Brake Job", "price": "100.00" }),
        )
        .await,
    )
    .await;

    // Customer with a car.
    let customer_id = created_id(
        post_json(
            &client,
            base,
            business_id,
            "/customers",
            json!({
                "name": "Dana Singh",
                "email": "dana@example.com",
                "phone": "555-0101",
                "vehicles": [{ "make": "Honda", "model": "Civic", "year": "2019" }],
            }),
        )
        .await,
    )
    .await;
    let customer = get_eventually(&client, base, business_id, &format!("/customers/{customer_id}")).await;
    let vehicle_id = customer["vehicles"][0]["vehicle_id"].as_str().unwrap().to_string();

    // Book the job.
    let booking_id = created_id(
        post_json(
            &client,
            base,
            business_id,
            "/bookings",
            json!({
                "scheduled_at": "2026-09-01T09:00:00Z",
                "customer_id": customer_id,
                "vehicle_id": vehicle_id,
                "service_lines": [{ "service_id": service_id, "quantity": 1 }],
            }),
        )
        .await,
    )
    .await;

    // Use two filters on the job; the ledger gives them up.
    let res = client
        .put(format!("{base}/bookings/{booking_id}/parts"))
        .header("x-business-id", business_id.to_string())
        .json(&json!({ "lines": [{ "item_id": item_id, "quantity": 2 }] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    on_hand_eventually(&client, base, business_id, &item_id, 8).await;

    // Finish and pay.
    for (path, body) in [
        ("status", json!({ "status": "ongoing" })),
        ("status", json!({ "status": "completed" })),
        ("payment-method", json!({ "payment_method": "cash" })),
        ("payment-status", json!({ "payment_status": "paid" })),
    ] {
        let res = post_json(
            &client,
            base,
            business_id,
            &format!("/bookings/{booking_id}/{path}"),
            body,
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    // Invoice at 15% tax: 100.00 + 2 x 25.00 = 150.00, tax 22.50.
    let res = post_json(
        &client,
        base,
        business_id,
        &format!("/invoices/bookings/{booking_id}"),
        json!({ "business_name": "Pitstop Garage", "tax_rate_bps": 1500 }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();

    let invoice = &body["invoice"];
    assert_eq!(invoice["subtotal"].as_u64(), Some(15000));
    assert_eq!(invoice["tax"].as_u64(), Some(2250));
    assert_eq!(invoice["total"].as_u64(), Some(17250));
    assert_eq!(
        invoice["header"]["invoice_number"].as_str(),
        Some(format!("INV-{booking_id}").as_str())
    );
    assert_eq!(invoice["header"]["customer_name"].as_str(), Some("Dana Singh"));
    assert_eq!(
        invoice["header"]["vehicle"].as_str(),
        Some("Honda Civic 2019")
    );

    let text = body["text"].as_str().unwrap();
    assert!(text.contains("Total:    172.50"));
}

#[tokio::test]
async fn parts_edit_beyond_stock_is_rejected_and_leaves_ledger_alone() {
    let server = TestServer::spawn().await;
    let client = client();
    let business_id = BusinessId::new();
    let base = &server.base_url;

    let item_id = created_id(
        post_json(
            &client,
            base,
            business_id,
            "/inventory/items",
            json!({ "name": "Wiper Blade", "retail_price": "12.00", "unit": "pcs" }),
        )
        .await,
    )
    .await;
    post_json(
        &client,
        base,
        business_id,
        &format!("/inventory/items/{item_id}/receive"),
        json!({ "quantity": 3 }),
    )
    .await;
    on_hand_eventually(&client, base, business_id, &item_id, 3).await;

    let customer_id = created_id(
        post_json(
            &client,
            base,
            business_id,
            "/customers",
            json!({ "name": "Lee Park", "email": "lee@example.com", "phone": "555-0102" }),
        )
        .await,
    )
    .await;
    let service_id = created_id(
        post_json(
            &client,
            base,
            business_id,
            "/services",
            json!({ "name": "Wiper Swap", "price": "10.00" }),
        )
        .await,
    )
    .await;
    let booking_id = created_id(
        post_json(
            &client,
            base,
            business_id,
            "/bookings",
            json!({
                "scheduled_at": "2026-09-02T10:00:00Z",
                "customer_id": customer_id,
                "service_lines": [{ "service_id": service_id, "quantity": 1 }],
            }),
        )
        .await,
    )
    .await;

    let res = client
        .put(format!("{base}/bookings/{booking_id}/parts"))
        .header("x-business-id", business_id.to_string())
        .json(&json!({ "lines": [{ "item_id": item_id, "quantity": 5 }] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"].as_str(), Some("insufficient_stock"));
    assert_eq!(body["requested"].as_i64(), Some(5));
    assert_eq!(body["available"].as_i64(), Some(3));

    on_hand_eventually(&client, base, business_id, &item_id, 3).await;
}

#[tokio::test]
async fn cancelling_a_booking_restocks_its_parts() {
    let server = TestServer::spawn().await;
    let client = client();
    let business_id = BusinessId::new();
    let base = &server.base_url;

    let item_id = created_id(
        post_json(
            &client,
            base,
            business_id,
            "/inventory/items",
            json!({ "name": "Air Filter", "retail_price": "18.00", "unit": "pcs" }),
        )
        .await,
    )
    .await;
    post_json(
        &client,
        base,
        business_id,
        &format!("/inventory/items/{item_id}/receive"),
        json!({ "quantity": 6 }),
    )
    .await;
    on_hand_eventually(&client, base, business_id, &item_id, 6).await;

    let customer_id = created_id(
        post_json(
            &client,
            base,
            business_id,
            "/customers",
            json!({ "name": "Ana Sousa", "email": "ana@example.com", "phone": "555-0103" }),
        )
        .await,
    )
    .await;
    let service_id = created_id(
        post_json(
            &client,
            base,
            business_id,
            "/services",
            json!({ "name": "Tune Up", "price": "80.00" }),
        )
        .await,
    )
    .await;
    let booking_id = created_id(
        post_json(
            &client,
            base,
            business_id,
            "/bookings",
            json!({
                "scheduled_at": "2026-09-03T11:00:00Z",
                "customer_id": customer_id,
                "service_lines": [{ "service_id": service_id, "quantity": 1 }],
            }),
        )
        .await,
    )
    .await;

    let res = client
        .put(format!("{base}/bookings/{booking_id}/parts"))
        .header("x-business-id", business_id.to_string())
        .json(&json!({ "lines": [{ "item_id": item_id, "quantity": 4 }] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    on_hand_eventually(&client, base, business_id, &item_id, 2).await;

    let res = post_json(
        &client,
        base,
        business_id,
        &format!("/bookings/{booking_id}/status"),
        json!({ "status": "cancelled" }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    on_hand_eventually(&client, base, business_id, &item_id, 6).await;
}

#[tokio::test]
async fn businesses_never_see_each_other() {
    let server = TestServer::spawn().await;
    let client = client();
    let shop_a = BusinessId::new();
    let shop_b = BusinessId::new();
    let base = &server.base_url;

    let item_id = created_id(
        post_json(
            &client,
            base,
            shop_a,
            "/inventory/items",
            json!({ "name": "Spark Plug", "retail_price": "6.00", "unit": "pcs" }),
        )
        .await,
    )
    .await;
    get_eventually(&client, base, shop_a, &format!("/inventory/items/{item_id}")).await;

    // Same id under another business resolves to nothing.
    let res = get_json(&client, base, shop_b, &format!("/inventory/items/{item_id}")).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = get_json(&client, base, shop_b, "/inventory/items").await;
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["items"].as_array().map(Vec::len), Some(0));
}
