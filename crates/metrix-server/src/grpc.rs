use crate::metric_service::ServiceError;
use crate::state::AppState;
use metrix_common::envelope::{EnvelopeError, HASH_METADATA, REAL_IP_METADATA};
use metrix_common::proto::metrics_server::{Metrics, MetricsServer};
use metrix_common::proto::{
    GetRequest, GetResponse, Metric, PingRequest, PingResponse, UpdateBatchRequest,
    UpdateBatchResponse, UpdateRequest, UpdateResponse,
};
use metrix_common::types::{MetricKind, Record, RequestMetric};
use tonic::codec::CompressionEncoding;
use tonic::metadata::MetadataMap;
use tonic::{Request, Response, Status};

pub struct MetricServiceImpl {
    state: AppState,
}

impl MetricServiceImpl {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Ready-to-mount server accepting and sending gzip messages.
    pub fn into_server(self) -> MetricsServer<Self> {
        MetricsServer::new(self)
            .accept_compressed(CompressionEncoding::Gzip)
            .send_compressed(CompressionEncoding::Gzip)
    }

    fn check_subnet(&self, metadata: &MetadataMap) -> Result<(), Status> {
        let Some(subnet) = self.state.trusted_subnet.as_deref() else {
            return Ok(());
        };
        let declared = metadata.get(REAL_IP_METADATA).and_then(|v| v.to_str().ok());
        if subnet.admits(declared) {
            Ok(())
        } else {
            tracing::warn!(subnet = %subnet, real_ip = declared.unwrap_or("-"), "gRPC batch from untrusted source");
            Err(Status::permission_denied("untrusted source"))
        }
    }

    /// Opens a batch request into wire items, verifying the signature when
    /// a key is configured.
    fn open_batch(&self, message: UpdateBatchRequest, hash: Option<&str>) -> Result<Vec<RequestMetric>, Status> {
        let opener = &self.state.opener;
        if !message.sealed.is_empty() {
            return opener.open(&message.sealed, hash).map_err(envelope_status);
        }

        let items = message
            .data
            .into_iter()
            .map(RequestMetric::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Status::invalid_argument(e.to_string()))?;
        if opener.signer().is_some() {
            let data = serde_json::to_vec(&items).map_err(|e| Status::internal(e.to_string()))?;
            opener.verify(&data, hash).map_err(envelope_status)?;
        }
        Ok(items)
    }
}

fn service_status(e: ServiceError) -> Status {
    match e {
        ServiceError::Invalid(e) => Status::invalid_argument(e.to_string()),
        ServiceError::NotFound { .. } => Status::not_found(e.to_string()),
        ServiceError::NotSupported(_) => Status::unimplemented(e.to_string()),
        ServiceError::Timeout => Status::deadline_exceeded(e.to_string()),
        ServiceError::Storage(_) => Status::internal(e.to_string()),
    }
}

fn envelope_status(e: EnvelopeError) -> Status {
    match e {
        EnvelopeError::Decrypt(_) | EnvelopeError::Key(_) => Status::internal(e.to_string()),
        _ => Status::invalid_argument(e.to_string()),
    }
}

#[tonic::async_trait]
impl Metrics for MetricServiceImpl {
    async fn get(&self, request: Request<GetRequest>) -> Result<Response<GetResponse>, Status> {
        let GetRequest { id, mtype } = request.into_inner();
        let kind: MetricKind = mtype
            .parse()
            .map_err(|e: metrix_common::types::ModelError| Status::invalid_argument(e.to_string()))?;
        let record = self.state.service.get(&id, kind).await.map_err(service_status)?;
        Ok(Response::new(GetResponse {
            metric: Some(Metric::from(&record)),
        }))
    }

    async fn update(&self, request: Request<UpdateRequest>) -> Result<Response<UpdateResponse>, Status> {
        let metric = request
            .into_inner()
            .metric
            .ok_or_else(|| Status::invalid_argument("metric is required"))?;
        let record = RequestMetric::try_from(metric)
            .and_then(|item| item.to_record())
            .map_err(|e| Status::invalid_argument(e.to_string()))?;
        let stored = self
            .state
            .service
            .push_record(record)
            .await
            .map_err(service_status)?;
        tracing::debug!(name = %stored.name(), value = %stored.value(), "gRPC update merged");
        Ok(Response::new(UpdateResponse {
            metric: Some(Metric::from(&stored)),
        }))
    }

    async fn update_batch(
        &self,
        request: Request<UpdateBatchRequest>,
    ) -> Result<Response<UpdateBatchResponse>, Status> {
        self.check_subnet(request.metadata())?;
        let hash = request
            .metadata()
            .get(HASH_METADATA)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let items = self
            .open_batch(request.into_inner(), hash.as_deref())
            .inspect_err(|status| tracing::warn!(error = %status.message(), "gRPC batch rejected"))?;
        if items.is_empty() {
            return Err(Status::invalid_argument("empty batch"));
        }
        let records = items
            .iter()
            .map(RequestMetric::to_record)
            .collect::<Result<Vec<Record>, _>>()
            .map_err(|e| Status::invalid_argument(e.to_string()))?;

        let count = records.len();
        self.state
            .service
            .push_batch(records)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "gRPC batch merge failed");
                service_status(e)
            })?;
        tracing::info!(items = count, "gRPC batch merged");
        Ok(Response::new(UpdateBatchResponse {}))
    }

    async fn ping(&self, _request: Request<PingRequest>) -> Result<Response<PingResponse>, Status> {
        self.state.service.ping().await.map_err(service_status)?;
        Ok(Response::new(PingResponse {}))
    }
}
