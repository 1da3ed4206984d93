//! App - アプリケーション層
//!
//! Combines the ports into the running engine.
//!
//! # 主要コンポーネント
//! - **SupervisedLoop**: retry-until-cancelled execution of every loop below
//! - **ProducerLoop**: poll one queue into a bounded per-producer channel
//! - **SamplerLoop**: unbiased fan-in of every producer channel
//! - **WorkerLoop**: route, handle and act on one work item
//! - **Daisy**: wiring, start-up and the [`EngineHandle`]

pub mod engine;
pub mod processor;
pub mod producer;
pub mod sampler;
pub mod supervised;

// 主要な型を再エクスポート
pub use self::engine::{Daisy, EngineHandle, ShutdownReport};
pub use self::processor::{RoutingWorkProcessor, SharedWorkReceiver, WorkProcessing, WorkerLoop};
pub use self::producer::ProducerLoop;
pub use self::sampler::{RandomWorkSampler, SamplerLoop, WorkSampling};
pub use self::supervised::{LoopReport, LoopState, LoopTask, SupervisedLoop};
