//! JSON-over-HTTP gateway for a live performance-testing service.
//!
//! All resources hang off `{protocol}://{server}/LoadTest/rest`. Login uses
//! HTTP Basic credentials; the service answers with a session cookie that the
//! client's cookie store replays on every later call. Project resources live
//! under `/domains/{domain}/projects/{project}/`.

use base64::Engine;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use super::backend::PcGateway;
use super::types::{
    EventLog, GatewayError, GatewayResult, RunRequest, RunResponse, RunResult, StartRunBody,
    TestData, TestInstance, TestSet, TrendReportRequest, TrendedRun,
};
use crate::session::ServerSettings;
use crate::trend_data::TrendReportData;

const JSON: &str = "application/json";

#[derive(Debug, Serialize)]
struct CreateInstanceBody {
    #[serde(rename = "TestID")]
    test_id: u32,
    #[serde(rename = "TestSetID")]
    test_set_id: u32,
}

/// Gateway backed by `reqwest`'s blocking client
#[derive(Debug, Clone)]
pub struct RestGateway {
    client: Client,
    base_url: String,
    project_url: String,
}

impl RestGateway {
    /// Build a gateway for the given server, honouring its proxy settings
    pub fn new(settings: &ServerSettings, connect_timeout: Duration) -> GatewayResult<Self> {
        let mut builder = Client::builder()
            .cookie_store(true)
            .connect_timeout(connect_timeout);

        if let Some(proxy) = &settings.proxy {
            let mut p = reqwest::Proxy::all(proxy.url.as_str())?;
            if let Some(user) = &proxy.user {
                p = p.basic_auth(user, proxy.password.as_deref().unwrap_or(""));
            }
            builder = builder.proxy(p);
        }

        let client = builder.build()?;
        let base_url = format!("{}/LoadTest/rest", settings.base_url());
        let project_url = format!(
            "{}/domains/{}/projects/{}",
            base_url, settings.domain, settings.project
        );

        Ok(Self {
            client,
            base_url,
            project_url,
        })
    }

    fn project(&self, path: &str) -> String {
        format!("{}/{}", self.project_url, path)
    }

    fn send(&self, request: RequestBuilder) -> GatewayResult<Response> {
        let response = request.header(ACCEPT, JSON).send()?;
        check_status(response)
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> GatewayResult<T> {
        let response = self.send(self.client.get(url))?;
        Ok(response.json()?)
    }

    fn post_json<B: Serialize, T: DeserializeOwned>(&self, url: &str, body: &B) -> GatewayResult<T> {
        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, JSON)
            .json(body);
        Ok(self.send(request)?.json()?)
    }
}

/// Turn a non-success status into a protocol error carrying the body text
fn check_status(response: Response) -> GatewayResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .ok()
        .filter(|body| !body.trim().is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());
    Err(GatewayError::Protocol {
        status: status.as_u16(),
        message,
    })
}

/// Value of a Basic `Authorization` header
fn basic_auth_header(user: &str, password: &str) -> String {
    let token = base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", user, password));
    format!("Basic {}", token)
}

impl PcGateway for RestGateway {
    fn authenticate(&self, user: &str, password: &str) -> GatewayResult<bool> {
        let url = format!("{}/authentication-point/authenticate", self.base_url);
        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, basic_auth_header(user, password))
            .send()?;
        match response.status().as_u16() {
            200..=299 => Ok(true),
            401 | 403 => Ok(false),
            _ => check_status(response).map(|_| false),
        }
    }

    fn logout(&self) -> GatewayResult<bool> {
        let url = format!("{}/authentication-point/logout", self.base_url);
        let response = self.client.get(&url).send()?;
        Ok(response.status().is_success())
    }

    fn start_run(&self, request: &RunRequest) -> GatewayResult<RunResponse> {
        self.post_json(&self.project("Runs"), &StartRunBody::try_from(request)?)
    }

    fn stop_run(&self, run_id: u32, reason: &str) -> GatewayResult<bool> {
        let url = self.project(&format!("Runs/{}/{}", run_id, reason));
        let response = self.client.post(&url).header(ACCEPT, JSON).send()?;
        Ok(response.status().is_success())
    }

    fn run_data(&self, run_id: u32) -> GatewayResult<RunResponse> {
        self.get_json(&self.project(&format!("Runs/{}", run_id)))
    }

    fn test_instances_by_test_id(&self, test_id: u32) -> GatewayResult<Vec<TestInstance>> {
        let query = format!("{{test-id[{}]}}", test_id);
        let request = self
            .client
            .get(self.project("testinstances"))
            .query(&[("query", query.as_str())]);
        Ok(self.send(request)?.json()?)
    }

    fn all_test_sets(&self) -> GatewayResult<Vec<TestSet>> {
        self.get_json(&self.project("testsets"))
    }

    fn create_test_instance(&self, test_id: u32, test_set_id: u32) -> GatewayResult<u32> {
        let created: TestInstance = self.post_json(
            &self.project("testinstances"),
            &CreateInstanceBody {
                test_id,
                test_set_id,
            },
        )?;
        Ok(created.instance_id)
    }

    fn test_data(&self, test_id: u32) -> GatewayResult<TestData> {
        self.get_json(&self.project(&format!("tests/{}", test_id)))
    }

    fn run_results(&self, run_id: u32) -> GatewayResult<Vec<RunResult>> {
        self.get_json(&self.project(&format!("Runs/{}/Results", run_id)))
    }

    fn run_result_data(&self, run_id: u32, result_id: u32, destination: &Path) -> GatewayResult<()> {
        let url = self.project(&format!("Runs/{}/Results/{}/data", run_id, result_id));
        let mut response = check_status(self.client.get(&url).send()?)?;
        let mut file = File::create(destination)?;
        std::io::copy(&mut response, &mut file)?;
        Ok(())
    }

    fn run_event_log(&self, run_id: u32) -> GatewayResult<EventLog> {
        self.get_json(&self.project(&format!("Runs/{}/EventLog", run_id)))
    }

    fn update_trend_report(
        &self,
        trend_report_id: &str,
        request: &TrendReportRequest,
    ) -> GatewayResult<()> {
        let url = self.project(&format!("TrendReports/{}", trend_report_id));
        self.send(
            self.client
                .post(&url)
                .header(CONTENT_TYPE, JSON)
                .json(request),
        )?;
        Ok(())
    }

    fn trend_report_metadata(&self, trend_report_id: &str) -> GatewayResult<Vec<TrendedRun>> {
        self.get_json(&self.project(&format!("TrendReports/{}", trend_report_id)))
    }

    fn trending_pdf(&self, trend_report_id: &str) -> GatewayResult<Box<dyn Read + Send>> {
        let url = self.project(&format!("TrendReports/{}/pdf", trend_report_id));
        let response = check_status(self.client.get(&url).send()?)?;
        Ok(Box::new(response))
    }

    fn trend_report_transactions(
        &self,
        trend_report_id: &str,
        run_id: u32,
    ) -> GatewayResult<TrendReportData> {
        let request = self
            .client
            .get(self.project(&format!("TrendReports/{}/data", trend_report_id)))
            .query(&[("runId", run_id)]);
        Ok(self.send(request)?.json()?)
    }
}
