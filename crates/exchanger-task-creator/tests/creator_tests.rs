//! Integration tests for [`Creator::create`] against a mocked downstream
//! webhook, covering the idempotency probe and predecessor-dependency
//! resolution (spec §4.2 steps 1 and 5).

use std::time::Duration;

use chrono::Utc;
use exchanger_downstream_client::DownstreamClient;
use exchanger_shared::{DiagramElementMetadata, TaskPayload, VariableMap};
use exchanger_task_creator::creator::Creator;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn base_payload() -> TaskPayload {
    TaskPayload {
        task_id: "T1".into(),
        topic: "create_review_task".into(),
        variables: VariableMap::new(),
        process_instance_id: "PI1".into(),
        process_definition_id: "PD1".into(),
        process_definition_key: "review-process".into(),
        activity_id: "Activity_1".into(),
        activity_instance_id: None,
        worker_id: "worker-1".into(),
        retries: None,
        create_time: Utc::now(),
        priority: 50,
        tenant_id: None,
        business_key: None,
        metadata: DiagramElementMetadata::default(),
        process_variables: VariableMap::new(),
    }
}

fn empty_list_response() -> serde_json::Value {
    serde_json::json!({"result": {"tasks": []}})
}

#[tokio::test]
async fn idempotent_replay_returns_existing_task_without_recreating() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/tasks.task.list.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "result": {"tasks": [{"id": "D42", "status": "2", "ufCamundaIdExternalTask": "T1"}]}
        })))
        .mount(&server)
        .await;

    // No other endpoint is mocked: if Creator::create re-enters the
    // creation path at all (template fetch, responsible lookup, task
    // creation) the unmatched request will panic the mock server.
    let downstream = DownstreamClient::new(server.uri(), Duration::from_secs(5)).unwrap();
    let creator = Creator::new(downstream, 1);

    let response = creator.create(&base_payload()).await.unwrap();
    assert_eq!(response["result"]["task"]["id"], "D42");
}

#[tokio::test]
async fn fallback_creation_resolves_two_predecessor_dependencies() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/tasks.task.list.json"))
        .and(body_partial_json(serde_json::json!({"filter": {"UF_CAMUNDA_ID_EXTERNAL_TASK": "T1"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_list_response()))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/imena.camunda.diagram.responsible.get.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "result": {
                "templateId": serde_json::Value::Null,
                "predecessors": ["Activity_0a", "Activity_0b"],
                "responsibleId": 7,
            }
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/imena.camunda.tasktemplate.get.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"result": serde_json::Value::Null})))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/tasks.task.list.json"))
        .and(body_partial_json(serde_json::json!({"filter": {"UF_ELEMENT_ID": "Activity_0a"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "result": {"tasks": [{"id": "D-pred-a", "status": "5", "ufElementId": "Activity_0a"}]}
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/tasks.task.list.json"))
        .and(body_partial_json(serde_json::json!({"filter": {"UF_ELEMENT_ID": "Activity_0b"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "result": {"tasks": [{"id": "D-pred-b", "status": "5", "ufElementId": "Activity_0b"}]}
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/imena.camunda.diagram.properties.list.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"result": []})))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/task.result.list.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"result": []})))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/tasks.task.add.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "result": {"task": {"id": "D99", "status": "2"}}
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/imena.camunda.task.dependency.add.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"result": true})))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/imena.camunda.sync.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"result": true})))
        .mount(&server)
        .await;

    let downstream = DownstreamClient::new(server.uri(), Duration::from_secs(5)).unwrap();
    let creator = Creator::new(downstream, 1);

    let response = creator.create(&base_payload()).await.unwrap();
    assert_eq!(response["result"]["task"]["id"], "D99");

    let dependency_requests = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|req| req.url.path() == "/imena.camunda.task.dependency.add.json")
        .count();
    assert_eq!(dependency_requests, 2);
}
