use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result, anyhow};
use log::{Level, debug};
use ndarray::{Array1, Array2, Array3, Array4, s};
use tract_onnx::prelude::{
    Datum, Framework, Graph, InferenceFact, InferenceModel, InferenceModelExt, IntoTensor,
    SimplePlan, Tensor, TypedFact, TypedOp, tvec,
};

use mtcnn_utils::timing_guard;

use crate::stages::{CascadeStages, FinalOutput, ProposalOutput, RefineOutput};

type RunnableStage = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Weight file for the proposal network inside the model directory.
pub const PROPOSAL_WEIGHTS: &str = "det1.onnx";
/// Weight file for the refinement network.
pub const REFINE_WEIGHTS: &str = "det2.onnx";
/// Weight file for the final classification network.
pub const FINAL_WEIGHTS: &str = "det3.onnx";

const REFINE_INPUT: [usize; 3] = [3, 24, 24];
const FINAL_INPUT: [usize; 3] = [3, 48, 48];

/// ONNX-backed stage networks executed with `tract-onnx`.
///
/// The proposal network is fully convolutional, so a runnable plan is
/// concretized per pyramid-level input size and cached; the refinement and
/// final networks run with fixed batch-1 plans iterated over candidates.
/// One loaded instance serves any number of detections and can be shared
/// read-only across threads (the plan cache sits behind a mutex).
#[derive(Debug)]
pub struct OnnxStages {
    proposal_graph: InferenceModel,
    proposal_plans: Mutex<HashMap<(usize, usize), Arc<RunnableStage>>>,
    refine_plan: RunnableStage,
    final_plan: RunnableStage,
}

impl OnnxStages {
    /// Load the three stage networks from `model_dir`.
    ///
    /// Expects `det1.onnx`, `det2.onnx` and `det3.onnx` inside the
    /// directory (the conventional stage-weight names, in ONNX form).
    pub fn load<P: AsRef<Path>>(model_dir: P) -> Result<Self> {
        let dir = model_dir.as_ref();
        anyhow::ensure!(dir.is_dir(), "model directory not found: {}", dir.display());
        let _guard = timing_guard("mtcnn_core::load_stages", Level::Debug);

        let proposal_graph = parse_graph(&dir.join(PROPOSAL_WEIGHTS))?;
        let refine_graph = parse_graph(&dir.join(REFINE_WEIGHTS))?;
        let final_graph = parse_graph(&dir.join(FINAL_WEIGHTS))?;

        let refine_plan =
            runnable_for_input(&refine_graph, [1, REFINE_INPUT[0], REFINE_INPUT[1], REFINE_INPUT[2]])
                .with_context(|| format!("while preparing {REFINE_WEIGHTS}"))?;
        let final_plan =
            runnable_for_input(&final_graph, [1, FINAL_INPUT[0], FINAL_INPUT[1], FINAL_INPUT[2]])
                .with_context(|| format!("while preparing {FINAL_WEIGHTS}"))?;

        debug!("cascade stage networks loaded from {}", dir.display());
        Ok(Self {
            proposal_graph,
            proposal_plans: Mutex::new(HashMap::new()),
            refine_plan,
            final_plan,
        })
    }

    /// Fetch or build the proposal plan for one pyramid-level input size.
    fn proposal_plan(&self, height: usize, width: usize) -> Result<Arc<RunnableStage>> {
        let mut cache = self
            .proposal_plans
            .lock()
            .map_err(|_| anyhow!("proposal plan cache poisoned"))?;
        if let Some(plan) = cache.get(&(height, width)) {
            return Ok(Arc::clone(plan));
        }

        debug!("concretizing proposal network for {width}x{height} input");
        let plan = Arc::new(
            runnable_for_input(&self.proposal_graph, [1, 3, height, width])
                .with_context(|| format!("while preparing {PROPOSAL_WEIGHTS} for {width}x{height}"))?,
        );
        cache.insert((height, width), Arc::clone(&plan));
        Ok(plan)
    }
}

impl CascadeStages for OnnxStages {
    fn propose(&self, input: &Array4<f32>) -> Result<ProposalOutput> {
        let shape = input.shape();
        anyhow::ensure!(
            shape[0] == 1 && shape[1] == 3 && shape[2] >= 12 && shape[3] >= 12,
            "proposal input must be (1, 3, h>=12, w>=12), got {:?}",
            shape
        );

        let plan = self.proposal_plan(shape[2], shape[3])?;
        let outputs = run_plan(&plan, tensor_from(input)?)?;

        let mut probs: Option<Array2<f32>> = None;
        let mut regs: Option<Array3<f32>> = None;
        for tensor in outputs {
            let shape = tensor.shape().to_vec();
            match shape.as_slice() {
                [1, 2, rows, cols] => {
                    let slice = tensor
                        .as_slice::<f32>()
                        .map_err(|e| anyhow!("proposal probability map is not f32: {e}"))?;
                    // Channel 1 carries the face probability.
                    let cells = rows * cols;
                    probs = Some(Array2::from_shape_vec(
                        (*rows, *cols),
                        slice[cells..2 * cells].to_vec(),
                    )?);
                }
                [1, 4, rows, cols] => {
                    let slice = tensor
                        .as_slice::<f32>()
                        .map_err(|e| anyhow!("proposal regression map is not f32: {e}"))?;
                    regs = Some(Array3::from_shape_vec((4, *rows, *cols), slice.to_vec())?);
                }
                other => anyhow::bail!("unexpected proposal output shape {:?}", other),
            }
        }

        let probs = probs.ok_or_else(|| anyhow!("proposal network produced no probability map"))?;
        let regs = regs.ok_or_else(|| anyhow!("proposal network produced no regression map"))?;
        anyhow::ensure!(
            regs.dim().1 == probs.dim().0 && regs.dim().2 == probs.dim().1,
            "proposal map sizes disagree: probs {:?}, regs {:?}",
            probs.dim(),
            regs.dim()
        );
        Ok(ProposalOutput { probs, regs })
    }

    fn refine(&self, batch: &Array4<f32>) -> Result<RefineOutput> {
        anyhow::ensure!(
            batch.shape()[1..] == REFINE_INPUT[..],
            "refinement batch must be (n, 3, 24, 24), got {:?}",
            batch.shape()
        );

        let n = batch.shape()[0];
        let mut scores = Vec::with_capacity(n);
        let mut regs = Vec::with_capacity(n * 4);
        for index in 0..n {
            let patch = batch.slice(s![index..index + 1, .., .., ..]).to_owned();
            let outputs = run_plan(&self.refine_plan, tensor_from(&patch)?)?;
            let decoded = decode_candidate(&outputs)?;
            anyhow::ensure!(
                decoded.landmarks.is_none(),
                "refinement network unexpectedly produced landmarks"
            );
            scores.push(decoded.score);
            regs.extend_from_slice(&decoded.reg);
        }

        Ok(RefineOutput {
            scores: Array1::from_vec(scores),
            regs: Array2::from_shape_vec((n, 4), regs)?,
        })
    }

    fn finalize(&self, batch: &Array4<f32>) -> Result<FinalOutput> {
        anyhow::ensure!(
            batch.shape()[1..] == FINAL_INPUT[..],
            "final batch must be (n, 3, 48, 48), got {:?}",
            batch.shape()
        );

        let n = batch.shape()[0];
        let mut scores = Vec::with_capacity(n);
        let mut regs = Vec::with_capacity(n * 4);
        let mut landmarks = Vec::with_capacity(n * 10);
        for index in 0..n {
            let patch = batch.slice(s![index..index + 1, .., .., ..]).to_owned();
            let outputs = run_plan(&self.final_plan, tensor_from(&patch)?)?;
            let decoded = decode_candidate(&outputs)?;
            let points = decoded
                .landmarks
                .ok_or_else(|| anyhow!("final network produced no landmarks"))?;
            scores.push(decoded.score);
            regs.extend_from_slice(&decoded.reg);
            landmarks.extend_from_slice(&points);
        }

        Ok(FinalOutput {
            scores: Array1::from_vec(scores),
            regs: Array2::from_shape_vec((n, 4), regs)?,
            landmarks: Array2::from_shape_vec((n, 10), landmarks)?,
        })
    }
}

/// Score, regression and optional landmarks decoded from one candidate run.
struct CandidateOutputs {
    score: f32,
    reg: [f32; 4],
    landmarks: Option<[f32; 10]>,
}

/// Classify per-candidate output tensors by their trailing dimension:
/// 2 values are class probabilities (face probability last), 4 are box
/// regressions, 10 are landmark coordinates.
fn decode_candidate(outputs: &[Tensor]) -> Result<CandidateOutputs> {
    let mut score: Option<f32> = None;
    let mut reg: Option<[f32; 4]> = None;
    let mut landmarks: Option<[f32; 10]> = None;

    for tensor in outputs {
        let slice = tensor
            .as_slice::<f32>()
            .map_err(|e| anyhow!("candidate output is not f32: {e}"))?;
        match slice.len() {
            2 => score = Some(slice[1]),
            4 => reg = Some([slice[0], slice[1], slice[2], slice[3]]),
            10 => {
                let mut points = [0.0f32; 10];
                points.copy_from_slice(slice);
                landmarks = Some(points);
            }
            other => anyhow::bail!("unexpected candidate output length {other}"),
        }
    }

    Ok(CandidateOutputs {
        score: score.ok_or_else(|| anyhow!("candidate run produced no probabilities"))?,
        reg: reg.ok_or_else(|| anyhow!("candidate run produced no box regression"))?,
        landmarks,
    })
}

fn parse_graph(path: &Path) -> Result<InferenceModel> {
    anyhow::ensure!(
        path.exists(),
        "stage network file not found: {}",
        path.display()
    );
    tract_onnx::onnx()
        .model_for_path(path)
        .with_context(|| format!("failed to parse ONNX graph from {}", path.display()))
}

fn runnable_for_input(graph: &InferenceModel, shape: [usize; 4]) -> Result<RunnableStage> {
    let [n, c, h, w] = shape;
    graph
        .clone()
        .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), tvec!(n, c, h, w)))
        .map_err(|e| anyhow!("unable to fix stage input shape: {e}"))?
        .into_optimized()
        .map_err(|e| anyhow!("unable to optimize stage graph: {e}"))?
        .into_runnable()
        .map_err(|e| anyhow!("unable to make stage graph runnable: {e}"))
}

fn run_plan(plan: &RunnableStage, input: Tensor) -> Result<Vec<Tensor>> {
    let outputs = plan
        .run(tvec![input.into()])
        .map_err(|e| anyhow!("stage execution failed: {e}"))?;
    Ok(outputs.into_iter().map(|value| value.into_tensor()).collect())
}

fn tensor_from(batch: &Array4<f32>) -> Result<Tensor> {
    let slice = batch
        .as_slice()
        .ok_or_else(|| anyhow!("stage input tensor is not contiguous"))?;
    Tensor::from_shape(batch.shape(), slice)
        .map_err(|e| anyhow!("failed to build stage input tensor: {e}"))
}
