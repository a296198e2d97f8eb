use super::error::InferenceError;
use super::vocab::TokenSequence;

/// Input tensor carrying the phoneme ids, shape `(1, N)`.
pub const INPUT_NAME: &str = "input";
/// Input tensor carrying `N`, shape `(1)`.
pub const INPUT_LENGTHS_NAME: &str = "input_lengths";
/// Input tensor carrying `[noise_scale, length_scale, noise_w]`, shape `(3)`.
pub const SCALES_NAME: &str = "scales";

/// The three named tensors a Piper graph is run with.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInputs {
    pub tokens: Vec<i64>,
    pub scales: [f32; 3],
}

impl ModelInputs {
    pub fn new(tokens: TokenSequence, scales: [f32; 3]) -> Self {
        Self {
            tokens: tokens.into_inner(),
            scales,
        }
    }

    /// Value of the `input_lengths` tensor.
    pub fn input_length(&self) -> i64 {
        self.tokens.len() as i64
    }

    /// Tokens and length narrowed for graphs that take int32 inputs.
    pub fn to_i32(&self) -> Result<(Vec<i32>, i32), InferenceError> {
        let narrow = |value: i64| {
            i32::try_from(value).map_err(|_| {
                InferenceError::ScheduleFailed(format!("{value} does not fit an int32 input"))
            })
        };
        let tokens = self
            .tokens
            .iter()
            .map(|&t| narrow(t))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((tokens, narrow(self.input_length())?))
    }
}

/// A loaded model bound to a compute backend.
pub trait InferenceSession: Send {
    /// Bind `inputs`, run the graph and copy the first output into an owned
    /// buffer. Blocks until the output is readable.
    fn run(&mut self, inputs: &ModelInputs) -> Result<Vec<f32>, InferenceError>;
}

/// Creates [`InferenceSession`]s from serialized model graphs.
pub trait InferenceBackend: Send {
    fn load(&self, model: &[u8]) -> Result<Box<dyn InferenceSession>, InferenceError>;
}

/// The single live model of an orchestrator.
pub struct ModelHandle {
    name: String,
    session: Box<dyn InferenceSession>,
    warmed_up: bool,
}

impl ModelHandle {
    pub fn new(name: impl Into<String>, session: Box<dyn InferenceSession>) -> Self {
        Self {
            name: name.into(),
            session,
            warmed_up: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_warmed_up(&self) -> bool {
        self.warmed_up
    }

    pub(crate) fn mark_warmed_up(&mut self) {
        self.warmed_up = true;
    }

    pub fn run(&mut self, inputs: &ModelInputs) -> Result<Vec<f32>, InferenceError> {
        let samples = self.session.run(inputs)?;
        if samples.is_empty() {
            return Err(InferenceError::EmptyOutput);
        }
        Ok(samples)
    }
}

impl Drop for ModelHandle {
    fn drop(&mut self) {
        log::info!("Disposing model '{}'", self.name);
    }
}

#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxBackend, PiperModelParams};

#[cfg(feature = "onnx")]
mod onnx {
    use ndarray::{arr1, Array2};
    use ort::execution_providers::CPUExecutionProvider;
    use ort::inputs;
    use ort::session::builder::GraphOptimizationLevel;
    use ort::session::Session;
    use ort::value::TensorRef;

    use super::{
        InferenceBackend, InferenceSession, ModelInputs, INPUT_LENGTHS_NAME, INPUT_NAME,
        SCALES_NAME,
    };
    use crate::engines::piper::error::InferenceError;

    /// Parameters for creating ONNX sessions.
    #[derive(Debug, Clone, Default)]
    pub struct PiperModelParams {
        /// Number of CPU threads to use for inference.
        /// `None` uses the ORT default (typically all available cores).
        pub num_threads: Option<usize>,
    }

    /// ONNX Runtime backend on the CPU execution provider.
    #[derive(Debug, Clone, Default)]
    pub struct OnnxBackend {
        params: PiperModelParams,
    }

    impl OnnxBackend {
        pub fn new(params: PiperModelParams) -> Self {
            Self { params }
        }
    }

    impl InferenceBackend for OnnxBackend {
        fn load(&self, model: &[u8]) -> Result<Box<dyn InferenceSession>, InferenceError> {
            let session = init_session(model, self.params.num_threads)
                .map_err(|e| InferenceError::LoadFailed(e.to_string()))?;
            let tokens_are_int32 = detect_int32_input(&session, INPUT_NAME);
            log::info!("Detected: input is int32={tokens_are_int32}");
            Ok(Box::new(OnnxSession {
                session,
                tokens_are_int32,
            }))
        }
    }

    fn init_session(model: &[u8], num_threads: Option<usize>) -> Result<Session, ort::Error> {
        let providers = vec![CPUExecutionProvider::default().build()];

        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_execution_providers(providers)?;

        if let Some(threads) = num_threads {
            builder = builder
                .with_intra_threads(threads)?
                .with_inter_threads(threads)?;
        }

        builder.commit_from_memory(model)
    }

    /// Detect whether the named input expects int32 (true) or int64 (false).
    ///
    /// Piper exports use int64; graphs converted for other runtimes often
    /// narrow the token tensors to int32.
    fn detect_int32_input(session: &Session, name: &str) -> bool {
        for input in session.inputs() {
            if input.name() == name {
                let type_str = format!("{:?}", input.dtype());
                return type_str.contains("Int32") || type_str.contains("int32");
            }
        }
        false
    }

    struct OnnxSession {
        session: Session,
        tokens_are_int32: bool,
    }

    impl OnnxSession {
        fn run_graph(&mut self, inputs: &ModelInputs) -> Result<Vec<f32>, InferenceError> {
            let schedule = |e: ort::Error| InferenceError::ScheduleFailed(e.to_string());
            let shape = |e: ndarray::ShapeError| InferenceError::ScheduleFailed(e.to_string());

            let seq_len = inputs.tokens.len();
            let scales = arr1(&inputs.scales);

            let output = if self.tokens_are_int32 {
                let (tokens, length) = inputs.to_i32()?;
                let tokens_arr = Array2::from_shape_vec((1, seq_len), tokens).map_err(shape)?;
                let lengths = arr1(&[length]);
                let feed = inputs![
                    INPUT_NAME => TensorRef::from_array_view(tokens_arr.view()).map_err(schedule)?,
                    INPUT_LENGTHS_NAME => TensorRef::from_array_view(lengths.view()).map_err(schedule)?,
                    SCALES_NAME => TensorRef::from_array_view(scales.view()).map_err(schedule)?,
                ];
                self.session.run(feed).map_err(schedule)?
            } else {
                let tokens_arr =
                    Array2::from_shape_vec((1, seq_len), inputs.tokens.clone()).map_err(shape)?;
                let lengths = arr1(&[inputs.input_length()]);
                let feed = inputs![
                    INPUT_NAME => TensorRef::from_array_view(tokens_arr.view()).map_err(schedule)?,
                    INPUT_LENGTHS_NAME => TensorRef::from_array_view(lengths.view()).map_err(schedule)?,
                    SCALES_NAME => TensorRef::from_array_view(scales.view()).map_err(schedule)?,
                ];
                self.session.run(feed).map_err(schedule)?
            };

            // Piper emits a single waveform tensor shaped (1, 1, 1, samples).
            let first_output = output
                .iter()
                .next()
                .ok_or_else(|| InferenceError::ScheduleFailed("No output from model".into()))?;
            let waveform = first_output
                .1
                .try_extract_array::<f32>()
                .map_err(schedule)?;

            Ok(waveform.iter().copied().collect())
        }
    }

    impl InferenceSession for OnnxSession {
        fn run(&mut self, inputs: &ModelInputs) -> Result<Vec<f32>, InferenceError> {
            self.run_graph(inputs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{InferenceSession, ModelHandle, ModelInputs};
    use crate::engines::piper::error::InferenceError;
    use crate::engines::piper::vocab::PhonemeVocabulary;
    use crate::engines::piper::testing::test_config;

    struct Fixed(Vec<f32>);

    impl InferenceSession for Fixed {
        fn run(&mut self, _inputs: &ModelInputs) -> Result<Vec<f32>, InferenceError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn inputs_carry_length_of_token_sequence() {
        let mut vocab = PhonemeVocabulary::new();
        vocab.activate(test_config("en-us", &[("a", &[4])]));
        let tokens = vocab.tokenize(&["a", "a"]).unwrap();

        let inputs = ModelInputs::new(tokens, [0.5, 1.0, 0.75]);
        assert_eq!(inputs.tokens, vec![1, 0, 4, 0, 4, 0, 2]);
        assert_eq!(inputs.input_length(), 7);
    }

    #[test]
    fn narrowing_to_int32_rejects_out_of_range_ids() {
        let fits = ModelInputs {
            tokens: vec![1, 0, 57, 0, 2],
            scales: [0.5, 1.0, 0.75],
        };
        assert_eq!(fits.to_i32().unwrap(), (vec![1, 0, 57, 0, 2], 5));

        let too_big = ModelInputs {
            tokens: vec![1, 0, i64::from(i32::MAX) + 1, 0, 2],
            scales: [0.5, 1.0, 0.75],
        };
        assert!(matches!(
            too_big.to_i32(),
            Err(InferenceError::ScheduleFailed(_))
        ));
    }

    #[test]
    fn empty_output_is_reported_distinctly() {
        let mut handle = ModelHandle::new("quiet", Box::new(Fixed(Vec::new())));
        let inputs = ModelInputs {
            tokens: vec![1, 0, 2],
            scales: [0.5, 1.0, 0.75],
        };
        assert!(matches!(
            handle.run(&inputs),
            Err(InferenceError::EmptyOutput)
        ));
    }

    #[test]
    fn handle_passes_samples_through() {
        let mut handle = ModelHandle::new("loud", Box::new(Fixed(vec![0.1, -0.2])));
        let inputs = ModelInputs {
            tokens: vec![1, 0, 2],
            scales: [0.5, 1.0, 0.75],
        };
        assert_eq!(handle.run(&inputs).unwrap(), vec![0.1, -0.2]);
        assert_eq!(handle.name(), "loud");
        assert!(!handle.is_warmed_up());
    }
}
