//! Feed-forward networks trained with back-propagation.
//!
//! Four families share this implementation and differ only in their
//! parameters: the deep network (and its alternative tanh/momentum flavour),
//! the general neural network, the layered network with L2 penalty, and the
//! single-layer softmax network (no hidden layers).

use anyhow::Result;
use ndarray::{Array, Array1, Array2, ArrayView1, ArrayView2, Axis, Dimension, Zip};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{Classifier, Family, Learner, softmax};
use crate::config::{Activation, DnnConfig, KerasConfig, NnConfig, Optimizer, TfConfig};
use crate::error::SlpError;

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPS: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq)]
pub struct MlpParams {
    pub hidden_layers: Vec<usize>,
    pub activation: Activation,
    pub optimizer: Optimizer,
    pub learning_rate: f64,
    /// Momentum for SGD; ignored by Adam.
    pub momentum: f64,
    pub epochs: usize,
    /// `None` trains full-batch.
    pub batch_size: Option<usize>,
    pub l2: f64,
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct MlpLearner {
    family: Family,
    params: MlpParams,
}

impl MlpLearner {
    pub fn new(family: Family, params: MlpParams) -> Self {
        Self { family, params }
    }

    pub fn dnn(cfg: &DnnConfig) -> Self {
        let (activation, optimizer, momentum) = if cfg.alt {
            (Activation::Tanh, Optimizer::Sgd, 0.9)
        } else {
            (cfg.activation, Optimizer::Adam, 0.0)
        };
        Self::new(
            Family::Dnn,
            MlpParams {
                hidden_layers: cfg.hidden_layers.clone(),
                activation,
                optimizer,
                learning_rate: cfg.learning_rate,
                momentum,
                epochs: cfg.epochs,
                batch_size: Some(cfg.batch_size),
                l2: cfg.l2,
                seed: cfg.seed,
            },
        )
    }

    pub fn nn(cfg: &NnConfig) -> Self {
        Self::new(
            Family::Nn,
            MlpParams {
                hidden_layers: cfg.hidden_layers.clone(),
                activation: cfg.activation,
                optimizer: Optimizer::Adam,
                learning_rate: cfg.learning_rate,
                momentum: 0.0,
                epochs: cfg.epochs,
                batch_size: Some(200),
                l2: cfg.l2,
                seed: cfg.seed,
            },
        )
    }

    pub fn keras(cfg: &KerasConfig) -> Self {
        Self::new(
            Family::Keras,
            MlpParams {
                hidden_layers: cfg.hidden_layers.clone(),
                activation: Activation::Relu,
                optimizer: Optimizer::Adam,
                learning_rate: cfg.learning_rate,
                momentum: 0.0,
                epochs: cfg.epochs,
                batch_size: Some(cfg.batch_size),
                l2: cfg.l2,
                seed: cfg.seed,
            },
        )
    }

    pub fn tf(cfg: &TfConfig) -> Self {
        Self::new(
            Family::Tf,
            MlpParams {
                hidden_layers: Vec::new(),
                activation: Activation::Relu,
                optimizer: Optimizer::Sgd,
                learning_rate: cfg.learning_rate,
                momentum: 0.0,
                epochs: cfg.epochs,
                batch_size: None,
                l2: 0.0,
                seed: cfg.seed,
            },
        )
    }

    pub fn params(&self) -> &MlpParams {
        &self.params
    }
}

impl Learner for MlpLearner {
    fn family(&self) -> Family {
        self.family
    }

    fn fit(
        &self,
        features: ArrayView2<f64>,
        targets: &[usize],
        n_classes: usize,
    ) -> Result<Box<dyn Classifier>> {
        Ok(Box::new(Mlp::train(&self.params, features, targets, n_classes)?))
    }
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Layer {
    w: Array2<f64>,
    b: Array1<f64>,
}

#[derive(Debug, Clone)]
pub struct Mlp {
    layers: Vec<Layer>,
    activation: Activation,
}

fn activate(activation: Activation, z: &mut Array2<f64>) {
    match activation {
        Activation::Relu => z.mapv_inplace(|v| v.max(0.0)),
        Activation::Tanh => z.mapv_inplace(f64::tanh),
        Activation::Sigmoid => z.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp())),
    }
}

/// Derivative expressed through the activation's output.
fn derivative(activation: Activation, a: &Array2<f64>) -> Array2<f64> {
    match activation {
        Activation::Relu => a.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
        Activation::Tanh => a.mapv(|v| 1.0 - v * v),
        Activation::Sigmoid => a.mapv(|v| v * (1.0 - v)),
    }
}

fn softmax_rows(z: &mut Array2<f64>) {
    for mut row in z.rows_mut() {
        let p = softmax(row.view());
        row.assign(&p);
    }
}

/// Per-parameter optimiser moments.
#[derive(Debug)]
struct Moments<D: Dimension> {
    m: Array<f64, D>,
    v: Array<f64, D>,
}

impl<D: Dimension> Moments<D> {
    fn like(a: &Array<f64, D>) -> Self {
        Self {
            m: Array::zeros(a.raw_dim()),
            v: Array::zeros(a.raw_dim()),
        }
    }

    fn step(&mut self, param: &mut Array<f64, D>, grad: &Array<f64, D>, params: &MlpParams, t: i32) {
        let lr = params.learning_rate;
        match params.optimizer {
            Optimizer::Sgd => {
                let mu = params.momentum;
                Zip::from(param)
                    .and(grad)
                    .and(&mut self.m)
                    .for_each(|p, &g, m| {
                        *m = mu * *m - lr * g;
                        *p += *m;
                    });
            }
            Optimizer::Adam => {
                let c1 = 1.0 - ADAM_BETA1.powi(t);
                let c2 = 1.0 - ADAM_BETA2.powi(t);
                Zip::from(param)
                    .and(grad)
                    .and(&mut self.m)
                    .and(&mut self.v)
                    .for_each(|p, &g, m, v| {
                        *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * g;
                        *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * g * g;
                        *p -= lr * (*m / c1) / ((*v / c2).sqrt() + ADAM_EPS);
                    });
            }
        }
    }
}

impl Mlp {
    pub fn train(
        params: &MlpParams,
        features: ArrayView2<f64>,
        targets: &[usize],
        n_classes: usize,
    ) -> Result<Self> {
        let (n, n_in) = features.dim();
        if n == 0 || n_classes == 0 {
            return Err(SlpError::EmptyDataset("network training set".into()).into());
        }
        if targets.len() != n {
            return Err(SlpError::DimensionMismatch {
                what: "network targets".into(),
                expected: n,
                found: targets.len(),
            }
            .into());
        }

        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
        let mut sizes = vec![n_in];
        sizes.extend(&params.hidden_layers);
        sizes.push(n_classes);

        let layers = sizes
            .windows(2)
            .map(|pair| {
                let (fan_in, fan_out) = (pair[0], pair[1]);
                let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
                Layer {
                    w: Array2::from_shape_fn((fan_in, fan_out), |_| rng.gen_range(-limit..limit)),
                    b: Array1::zeros(fan_out),
                }
            })
            .collect();
        let mut net = Mlp {
            layers,
            activation: params.activation,
        };

        let mut onehot = Array2::<f64>::zeros((n, n_classes));
        for (i, &t) in targets.iter().enumerate() {
            onehot[[i, t]] = 1.0;
        }

        let mut w_moments: Vec<Moments<ndarray::Ix2>> =
            net.layers.iter().map(|l| Moments::like(&l.w)).collect();
        let mut b_moments: Vec<Moments<ndarray::Ix1>> =
            net.layers.iter().map(|l| Moments::like(&l.b)).collect();

        let batch = params.batch_size.unwrap_or(n).clamp(1, n);
        let mut order: Vec<usize> = (0..n).collect();
        let mut t = 0i32;

        for epoch in 0..params.epochs {
            order.shuffle(&mut rng);
            let mut loss = 0.0;
            for chunk in order.chunks(batch) {
                let xb = features.select(Axis(0), chunk);
                let yb = onehot.select(Axis(0), chunk);
                let (grads, batch_loss) = net.gradients(&xb, &yb, params.l2, n);
                loss += batch_loss * chunk.len() as f64;

                t = t.saturating_add(1);
                for (l, (gw, gb)) in grads.into_iter().enumerate() {
                    w_moments[l].step(&mut net.layers[l].w, &gw, params, t);
                    b_moments[l].step(&mut net.layers[l].b, &gb, params, t);
                }
            }
            if epoch % 50 == 0 || epoch + 1 == params.epochs {
                log::trace!("epoch {epoch}: loss {:.5}", loss / n as f64);
            }
        }
        Ok(net)
    }

    /// Forward pass keeping every layer's output; the last entry holds class probabilities.
    fn forward(&self, x: &Array2<f64>) -> Vec<Array2<f64>> {
        let mut acts = Vec::with_capacity(self.layers.len() + 1);
        acts.push(x.clone());
        let last = self.layers.len() - 1;
        for (l, layer) in self.layers.iter().enumerate() {
            let mut z = acts[l].dot(&layer.w) + &layer.b;
            if l == last {
                softmax_rows(&mut z);
            } else {
                activate(self.activation, &mut z);
            }
            acts.push(z);
        }
        acts
    }

    /// Cross-entropy gradients for one mini-batch, plus its mean loss.
    fn gradients(
        &self,
        x: &Array2<f64>,
        y: &Array2<f64>,
        l2: f64,
        n_total: usize,
    ) -> (Vec<(Array2<f64>, Array1<f64>)>, f64) {
        let acts = self.forward(x);
        let m = x.nrows() as f64;
        let probs = &acts[acts.len() - 1];
        let loss = -(y * &probs.mapv(|p| p.max(1e-12).ln())).sum() / m;

        let mut delta = (probs - y) / m;
        let mut grads = Vec::with_capacity(self.layers.len());
        for l in (0..self.layers.len()).rev() {
            let layer = &self.layers[l];
            let mut gw = acts[l].t().dot(&delta);
            if l2 > 0.0 {
                gw.scaled_add(l2 / n_total as f64, &layer.w);
            }
            let gb = delta.sum_axis(Axis(0));
            if l > 0 {
                delta = delta.dot(&layer.w.t()) * derivative(self.activation, &acts[l]);
            }
            grads.push((gw, gb));
        }
        grads.reverse();
        (grads, loss)
    }
}

impl Classifier for Mlp {
    fn predict_proba(&self, features: ArrayView1<f64>) -> Array1<f64> {
        let x = features.to_owned().insert_axis(Axis(0));
        let acts = self.forward(&x);
        acts[acts.len() - 1].row(0).to_owned()
    }
}
