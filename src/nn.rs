//! Neural Network inference.
//!
//! Sequence classifiers are ONNX models taking a single `[1, sequence_length, feature_size]` `f32`
//! tensor and producing one probability per class label. Inference runs on the CPU via
//! [`tract_onnx`].

use std::{borrow::Cow, fmt, path::Path, sync::Arc};

use tract_onnx::prelude::{
    tvec, DatumExt, Framework, Graph, InferenceModelExt, SimplePlan, Tensor, TypedFact, TypedOp,
};

type Model = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A model that maps a window of feature vectors to a class probability distribution.
///
/// This is the seam between the classifier and the inference runtime; tests substitute their own
/// implementations.
pub trait SequenceModel: Send + Sync {
    /// Runs one forward pass.
    ///
    /// `input` holds `shape[0] * shape[1] * shape[2]` values in row-major order.
    fn estimate(&self, input: &[f32], shape: [usize; 3]) -> anyhow::Result<Vec<f32>>;
}

/// Produces a [`SequenceModel`]. Invoked on a background thread.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> anyhow::Result<Box<dyn SequenceModel>>;

    /// Human-readable description of where the model comes from, used in log messages.
    fn describe(&self) -> String;
}

/// Neural network loader.
pub struct Loader<'a> {
    model_data: Cow<'a, [u8]>,
    input_shape: Option<[usize; 3]>,
}

impl<'a> Loader<'a> {
    fn new(data: Cow<'a, [u8]>) -> Self {
        Self {
            model_data: data,
            input_shape: None,
        }
    }

    /// Fixes the shape of the network's input tensor.
    ///
    /// Sequence models are usually exported with a symbolic batch (and sometimes sequence)
    /// dimension, which has to be made concrete before the network can be optimized.
    pub fn with_input_shape(mut self, shape: [usize; 3]) -> Self {
        self.input_shape = Some(shape);
        self
    }

    /// Loads and optimizes the network.
    ///
    /// Returns an error if the network data is malformed, if the network data is incomplete, or if
    /// the network uses unimplemented operations.
    pub fn load(self) -> anyhow::Result<NeuralNetwork> {
        let mut graph = tract_onnx::onnx().model_for_read(&mut &*self.model_data)?;
        if let Some(shape) = self.input_shape {
            graph = graph.with_input_fact(0, f32::fact(shape).into())?;
        }
        let model = graph.into_optimized()?.into_runnable()?;

        let inputs = model.model().inputs.len();
        if inputs != 1 {
            anyhow::bail!("sequence model has to take exactly 1 input, this one takes {inputs}");
        }

        Ok(NeuralNetwork(Arc::new(NeuralNetworkImpl {
            inner: model,
            input_shape: self.input_shape,
        })))
    }
}

/// A neural network that can be used for inference.
///
/// This is a cheaply [`Clone`]able handle to the underlying network structures.
#[derive(Clone)]
pub struct NeuralNetwork(Arc<NeuralNetworkImpl>);

struct NeuralNetworkImpl {
    inner: Model,
    input_shape: Option<[usize; 3]>,
}

impl NeuralNetwork {
    /// Loads a pre-trained model from an ONNX file path.
    ///
    /// The path must have a `.onnx` extension.
    pub fn from_path<'a, P: AsRef<Path>>(path: P) -> anyhow::Result<Loader<'a>> {
        Self::from_path_impl(path.as_ref())
    }

    fn from_path_impl<'a>(path: &Path) -> anyhow::Result<Loader<'a>> {
        match path.extension() {
            Some(ext) if ext == "onnx" => {}
            _ => anyhow::bail!(
                "neural network file '{}' must have `.onnx` extension",
                path.display()
            ),
        }

        let model_data = std::fs::read(path)?;
        Ok(Loader::new(model_data.into()))
    }

    /// Loads a pre-trained model from an in-memory ONNX file.
    pub fn from_onnx(raw: &[u8]) -> anyhow::Result<Loader<'_>> {
        Ok(Loader::new(raw.into()))
    }

    /// Returns the number of output nodes of the network.
    pub fn num_outputs(&self) -> usize {
        self.0.inner.model().outputs.len()
    }

    /// Runs the network on one input tensor, returning the flattened first output.
    #[doc(alias = "infer")]
    pub fn estimate(&self, input: &[f32], shape: [usize; 3]) -> anyhow::Result<Vec<f32>> {
        if let Some(expected) = self.0.input_shape {
            if expected != shape {
                anyhow::bail!("input shape {shape:?} does not match network input {expected:?}");
            }
        }

        let tensor = Tensor::from_shape(&shape, input)?;
        let outputs = self.0.inner.run(tvec!(tensor.into()))?;
        let Some(first) = outputs.first() else {
            anyhow::bail!("network produced no outputs");
        };
        let values = first.to_array_view::<f32>()?.iter().copied().collect();
        Ok(values)
    }
}

impl fmt::Debug for NeuralNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NeuralNetwork")
            .field("input_shape", &self.0.input_shape)
            .field("num_outputs", &self.num_outputs())
            .finish()
    }
}

impl SequenceModel for NeuralNetwork {
    fn estimate(&self, input: &[f32], shape: [usize; 3]) -> anyhow::Result<Vec<f32>> {
        NeuralNetwork::estimate(self, input, shape)
    }
}

/// Loads an ONNX sequence model from the file system.
#[derive(Debug, Clone)]
pub struct OnnxLoader {
    path: std::path::PathBuf,
    input_shape: [usize; 3],
}

impl OnnxLoader {
    pub fn new<P: Into<std::path::PathBuf>>(
        path: P,
        sequence_length: usize,
        feature_size: usize,
    ) -> Self {
        Self {
            path: path.into(),
            input_shape: [1, sequence_length, feature_size],
        }
    }
}

impl ModelLoader for OnnxLoader {
    fn load(&self) -> anyhow::Result<Box<dyn SequenceModel>> {
        let nn = NeuralNetwork::from_path(&self.path)?
            .with_input_shape(self.input_shape)
            .load()?;
        log::debug!("loaded {:?} from '{}'", nn, self.path.display());
        Ok(Box::new(nn))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
