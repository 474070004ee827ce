//! Tensor-transform stage.
//!
//! Runs the embedding vector through the GPU compute backend when one is
//! configured. Every failure mode — no backend, backend error, wrong-length
//! output — degrades to the CPU identity fallback, which passes the vector
//! through unmodified at reduced confidence. This stage never fails a job.

use uuid::Uuid;

use crate::diagnostics::{DiagnosticsHub, PipelineEvent};
use crate::pipeline::traits::ComputeBackend;
use crate::pipeline::types::{EmbeddingResult, TensorMetadata, TensorResult, TensorSource};

const GPU_CONFIDENCE: f32 = 0.9;
const IDENTITY_CONFIDENCE: f32 = 0.8;

pub async fn transform(
    backend: Option<&dyn ComputeBackend>,
    job_id: Uuid,
    embedding: &EmbeddingResult,
    diagnostics: &DiagnosticsHub,
) -> TensorResult {
    if let Some(backend) = backend {
        match backend.transform(&embedding.vector).await {
            Ok(vector) if vector.len() == embedding.vector.len() => {
                return result(job_id, vector, TensorSource::GpuTransform, GPU_CONFIDENCE);
            }
            Ok(vector) => {
                fall_back(
                    job_id,
                    format!(
                        "backend returned {} values for {} inputs",
                        vector.len(),
                        embedding.vector.len()
                    ),
                    diagnostics,
                );
            }
            Err(e) => {
                fall_back(job_id, e.to_string(), diagnostics);
            }
        }
    }

    result(
        job_id,
        embedding.vector.clone(),
        TensorSource::CpuIdentity,
        IDENTITY_CONFIDENCE,
    )
}

fn fall_back(job_id: Uuid, reason: String, diagnostics: &DiagnosticsHub) {
    tracing::warn!(job_id = %job_id, reason = %reason, "GPU transform failed, using identity fallback");
    diagnostics.emit(PipelineEvent::GpuFallback {
        job_id: job_id.to_string(),
        reason,
    });
}

fn result(job_id: Uuid, vector: Vec<f32>, source: TensorSource, confidence: f32) -> TensorResult {
    let dimensions = vector.len();
    TensorResult {
        vector,
        dimensions,
        metadata: TensorMetadata {
            source,
            produced_at: chrono::Utc::now(),
            id: job_id,
            confidence,
        },
    }
}

// ═══════════════════════════════════════════════════════════
// wgpu compute backend (feature-gated)
// ═══════════════════════════════════════════════════════════

#[cfg(feature = "gpu-compute")]
pub use gpu::WgpuBackend;

#[cfg(feature = "gpu-compute")]
mod gpu {
    use async_trait::async_trait;
    use wgpu::util::DeviceExt;

    use crate::pipeline::error::PipelineError;
    use crate::pipeline::traits::ComputeBackend;

    /// Element-wise softsign normalization, `x / (1 + |x|)`, keeping every
    /// component in `(-1, 1)` before index reduction.
    const SHADER: &str = r#"
@group(0) @binding(0)
var<storage, read_write> data: array<f32>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let i = id.x;
    if (i >= arrayLength(&data)) {
        return;
    }
    let v = data[i];
    data[i] = v / (1.0 + abs(v));
}
"#;

    /// GPU transform over wgpu. Construction fails cleanly when no adapter
    /// is available; callers then run without a backend.
    pub struct WgpuBackend {
        device: wgpu::Device,
        queue: wgpu::Queue,
        pipeline: wgpu::ComputePipeline,
    }

    impl WgpuBackend {
        pub async fn new() -> Result<Self, PipelineError> {
            let instance = wgpu::Instance::default();
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions::default())
                .await
                .ok_or_else(|| {
                    PipelineError::ComputeBackend("no compatible GPU adapter".to_string())
                })?;

            let (device, queue) = adapter
                .request_device(&wgpu::DeviceDescriptor::default(), None)
                .await
                .map_err(|e| PipelineError::ComputeBackend(e.to_string()))?;

            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("softsign"),
                source: wgpu::ShaderSource::Wgsl(SHADER.into()),
            });

            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("softsign"),
                layout: None,
                module: &module,
                entry_point: "main",
                compilation_options: Default::default(),
                cache: None,
            });

            tracing::info!(adapter = %adapter.get_info().name, "wgpu compute backend ready");
            Ok(Self {
                device,
                queue,
                pipeline,
            })
        }
    }

    #[async_trait]
    impl ComputeBackend for WgpuBackend {
        async fn transform(&self, input: &[f32]) -> Result<Vec<f32>, PipelineError> {
            if input.is_empty() {
                return Ok(vec![]);
            }

            let bytes: Vec<u8> = input.iter().flat_map(|v| v.to_le_bytes()).collect();
            let buffer = self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("tensor-input"),
                    contents: &bytes,
                    usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
                });
            let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("tensor-readback"),
                size: bytes.len() as u64,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });

            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("tensor-bind"),
                layout: &self.pipeline.get_bind_group_layout(0),
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            });

            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: None,
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups((input.len() as u32 + 63) / 64, 1, 1);
            }
            encoder.copy_buffer_to_buffer(&buffer, 0, &staging, 0, bytes.len() as u64);
            self.queue.submit(Some(encoder.finish()));

            let slice = staging.slice(..);
            let (tx, rx) = tokio::sync::oneshot::channel();
            slice.map_async(wgpu::MapMode::Read, move |r| {
                let _ = tx.send(r);
            });
            self.device.poll(wgpu::Maintain::Wait);
            rx.await
                .map_err(|_| PipelineError::ComputeBackend("readback cancelled".to_string()))?
                .map_err(|e| PipelineError::ComputeBackend(e.to_string()))?;

            let mapped = slice.get_mapped_range();
            let output = mapped
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
            drop(mapped);
            staging.unmap();

            Ok(output)
        }
    }
}
