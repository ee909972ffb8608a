//! Pairwise control barrier certificate network

use burn::module::Module;
use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;

use super::neighbors::{NeighborSelection, select_neighbors};
use super::tensors::{identity, planar_distance, tensor_to_vec};

/// Channels seen by the certificate: relative state (4), self flag, distance minus radius
pub const CERTIFICATE_INPUT_SIZE: usize = 6;

/// Configuration for the certificate network
#[derive(Debug, Config)]
pub struct CertificateConfig {
    /// Width of the first pointwise layer
    pub hidden_size_1: usize,
    /// Width of the second pointwise layer
    pub hidden_size_2: usize,
    /// Width of the third pointwise layer
    pub hidden_size_3: usize,
    /// Maximum neighbors per agent
    pub top_k: usize,
    /// Neighbors beyond this distance are masked out
    pub obs_radius: f32,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            hidden_size_1: 64,
            hidden_size_2: 128,
            hidden_size_3: 64,
            top_k: 12,
            obs_radius: 1.0,
        }
    }
}

/// Certificate values for every neighbor slot
#[derive(Debug, Clone)]
pub struct CertificateOutput<B: Backend> {
    /// `[n, k, 1]`, zero in masked slots; negative means dangerous
    pub h: Tensor<B, 3>,
    /// `[n, k, 1]`, 1.0 for neighbors within the observation radius
    pub mask: Tensor<B, 3>,
    /// Neighbor slots the values refer to
    pub neighbors: NeighborSelection<B>,
}

/// Scores each (agent, neighbor) pair independently with shared weights.
///
/// The layers act pointwise over the last axis, so the network applies to
/// any swarm size.
#[derive(Module, Debug)]
pub struct CertificateNet<B: Backend> {
    conv_1: Linear<B>,
    conv_2: Linear<B>,
    conv_3: Linear<B>,
    conv_4: Linear<B>,
    activation: Relu,
    top_k: usize,
    obs_radius: f32,
}

impl<B: Backend> CertificateNet<B> {
    pub fn new(device: &B::Device, config: &CertificateConfig) -> Self {
        Self {
            conv_1: LinearConfig::new(CERTIFICATE_INPUT_SIZE, config.hidden_size_1).init(device),
            conv_2: LinearConfig::new(config.hidden_size_1, config.hidden_size_2).init(device),
            conv_3: LinearConfig::new(config.hidden_size_2, config.hidden_size_3).init(device),
            conv_4: LinearConfig::new(config.hidden_size_3, 1).init(device),
            activation: Relu::new(),
            top_k: config.top_k,
            obs_radius: config.obs_radius,
        }
    }

    /// Evaluate the certificate on a `[n, n, 4]` relative-state tensor.
    ///
    /// `r` is the safe radius subtracted in the distance channel. Passing
    /// `neighbors` pins the slots to an earlier selection.
    pub fn forward(
        &self,
        x: Tensor<B, 3>,
        r: f32,
        neighbors: Option<&NeighborSelection<B>>,
    ) -> CertificateOutput<B> {
        let [n, _, _] = x.dims();
        let device = x.device();

        let d_norm = planar_distance(x.clone(), 1e-4);
        let eye = identity::<B>(n, &device).unsqueeze_dim::<3>(2);
        let x = Tensor::cat(vec![x, eye, d_norm.sub_scalar(r)], 2);
        let (x, neighbors) = select_neighbors(x, self.top_k, neighbors);

        let dist = planar_distance(x.clone().detach(), 1e-4);
        let mask = dist.lower_equal_elem(self.obs_radius).float();

        let h = self.activation.forward(self.conv_1.forward(x));
        let h = self.activation.forward(self.conv_2.forward(h));
        let h = self.activation.forward(self.conv_3.forward(h));
        let h = self.conv_4.forward(h) * mask.clone();

        CertificateOutput { h, mask, neighbors }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// All weights and biases, flattened in layer order
    pub fn flat_parameters(&self) -> Vec<f32> {
        [&self.conv_1, &self.conv_2, &self.conv_3, &self.conv_4]
            .into_iter()
            .flat_map(linear_parameters)
            .collect()
    }
}

pub(crate) fn linear_parameters<B: Backend>(layer: &Linear<B>) -> Vec<f32> {
    let mut values = tensor_to_vec(layer.weight.val());
    if let Some(bias) = &layer.bias {
        values.extend(tensor_to_vec(bias.val()));
    }
    values
}
