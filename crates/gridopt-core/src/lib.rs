//! # gridopt-core: DC Network Model
//!
//! Data structures for DC (linearized) power network analysis and the glue
//! that turns a network into optimization problem blocks.
//!
//! ## Design
//!
//! Networks are **undirected multigraphs**:
//! - **Nodes**: buses, generators and loads ([`Node`])
//! - **Edges**: branches between buses ([`Branch`]), lines and transformers alike
//!
//! Generators and loads are nodes that point at their bus by [`BusId`] rather
//! than by an edge, so parallel branches and multiple injections per bus need
//! no special casing.
//!
//! Which physical quantities are decision variables is decided by the caller
//! through [`Network::set_flags`] (see [`flags`]). A [`problem::Problem`] is
//! then built over exactly the flagged variables.
//!
//! ## Quick Start
//!
//! ```rust
//! use gridopt_core::*;
//!
//! let mut net = Network::new();
//! net.add_bus(Bus::new(BusId::new(1), "north").as_slack());
//! net.add_bus(Bus::new(BusId::new(2), "south"));
//! net.add_gen(
//!     Gen::new(GenId::new(1), "g1", BusId::new(1))
//!         .with_p_limits(0.0, 200.0)
//!         .with_cost(CostModel::quadratic(0.0, 20.0, 0.01)),
//! );
//! net.add_load(Load::new(LoadId::new(1), "l2", BusId::new(2), 80.0));
//! net.add_branch(Branch::new(BranchId::new(1), "n-s", BusId::new(1), BusId::new(2), 0.1))
//!     .unwrap();
//!
//! net.set_flags(ObjectType::Bus, Flags::VARS, Selector::BusNotSlack, VarKind::BusAngle)
//!     .unwrap();
//! net.set_flags(
//!     ObjectType::Gen,
//!     Flags::VARS | Flags::BOUNDED,
//!     Selector::GenPAdjust,
//!     VarKind::GenActivePower,
//! )
//! .unwrap();
//! assert_eq!(net.num_vars(), 2);
//! assert_eq!(net.num_bounded(), 1);
//! ```

use std::collections::HashMap;

use petgraph::{prelude::*, Undirected};
use serde::{Deserialize, Serialize};

pub mod error;
pub mod flags;
pub mod problem;
pub mod units;

pub use error::{NetworkError, NetworkResult};
pub use flags::{Flags, ObjectType, Selector, VarEntry, VarKey, VarKind, VarRegistry};
pub use petgraph::graph::{EdgeIndex, NodeIndex};
pub use problem::{Constraint, ConstraintKind, Function, FunctionKind, Problem};
pub use units::{MegavoltAmperes, Megawatts, Radians};

/// Default system base (MVA)
pub const DEFAULT_BASE_POWER: f64 = 100.0;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(usize);

        impl $name {
            #[inline]
            pub fn new(value: usize) -> Self {
                $name(value)
            }
            #[inline]
            pub fn value(&self) -> usize {
                self.0
            }
        }
    };
}

id_newtype!(BusId);
id_newtype!(BranchId);
id_newtype!(GenId);
id_newtype!(LoadId);

#[derive(Debug, Clone)]
pub struct Bus {
    pub id: BusId,
    pub name: String,
    /// Voltage angle
    pub angle: Radians,
    /// Reference bus; its angle is never a variable
    pub slack: bool,
    /// Multiplier of the bus power-balance equation ($/h per p.u.)
    pub sens_p_balance: f64,
}

impl Default for Bus {
    fn default() -> Self {
        Self {
            id: BusId(0),
            name: String::new(),
            angle: Radians::ZERO,
            slack: false,
            sens_p_balance: 0.0,
        }
    }
}

impl Bus {
    pub fn new(id: BusId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn as_slack(mut self) -> Self {
        self.slack = true;
        self
    }

    pub fn with_angle(mut self, angle_rad: f64) -> Self {
        self.angle = Radians(angle_rad);
        self
    }
}

/// Generator cost model.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CostModel {
    #[default]
    NoCost,
    /// `cost = sum(coeffs[i] * P^i)` in $/h with P in MW; `coeffs[0]` is the constant term.
    Polynomial(Vec<f64>),
}

impl CostModel {
    /// `c0 + c1*P + c2*P^2`
    pub fn quadratic(c0: f64, c1: f64, c2: f64) -> Self {
        CostModel::Polynomial(vec![c0, c1, c2])
    }

    /// `c0 + c1*P`
    pub fn linear(c0: f64, c1: f64) -> Self {
        CostModel::Polynomial(vec![c0, c1])
    }

    /// Cost at `p_mw` ($/h)
    pub fn evaluate(&self, p_mw: f64) -> f64 {
        match self {
            CostModel::NoCost => 0.0,
            CostModel::Polynomial(coeffs) => coeffs
                .iter()
                .enumerate()
                .map(|(i, c)| c * p_mw.powi(i as i32))
                .sum(),
        }
    }

    /// Marginal cost at `p_mw` ($/MWh)
    pub fn marginal_cost(&self, p_mw: f64) -> f64 {
        match self {
            CostModel::NoCost => 0.0,
            CostModel::Polynomial(coeffs) => coeffs
                .iter()
                .enumerate()
                .skip(1)
                .map(|(i, c)| (i as f64) * c * p_mw.powi(i as i32 - 1))
                .sum(),
        }
    }

    /// `(c0, c1, c2)`, or `None` if the polynomial has a nonzero term above
    /// second order.
    pub fn quadratic_coefficients(&self) -> Option<(f64, f64, f64)> {
        match self {
            CostModel::NoCost => Some((0.0, 0.0, 0.0)),
            CostModel::Polynomial(coeffs) => {
                if coeffs.iter().skip(3).any(|c| *c != 0.0) {
                    return None;
                }
                let c = |i: usize| coeffs.get(i).copied().unwrap_or(0.0);
                Some((c(0), c(1), c(2)))
            }
        }
    }

    fn degree(&self) -> usize {
        match self {
            CostModel::NoCost => 0,
            CostModel::Polynomial(coeffs) => coeffs
                .iter()
                .rposition(|c| *c != 0.0)
                .unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Gen {
    pub id: GenId,
    pub name: String,
    pub bus: BusId,
    /// Active power output
    pub active_power: Megawatts,
    pub pmin: Megawatts,
    pub pmax: Megawatts,
    /// In-service status
    pub status: bool,
    /// Output may be redispatched by the optimizer
    pub adjustable: bool,
    pub cost_model: CostModel,
    /// Multiplier of the upper output bound ($/h per p.u.)
    pub sens_p_u_bound: f64,
    /// Multiplier of the lower output bound ($/h per p.u.)
    pub sens_p_l_bound: f64,
}

impl Gen {
    /// In-service adjustable generator with no limits and no cost
    pub fn new(id: GenId, name: impl Into<String>, bus: BusId) -> Self {
        Self {
            id,
            name: name.into(),
            bus,
            active_power: Megawatts(0.0),
            pmin: Megawatts(0.0),
            pmax: Megawatts(f64::INFINITY),
            status: true,
            adjustable: true,
            cost_model: CostModel::NoCost,
            sens_p_u_bound: 0.0,
            sens_p_l_bound: 0.0,
        }
    }

    /// Set active power limits (in MW)
    pub fn with_p_limits(mut self, pmin: f64, pmax: f64) -> Self {
        self.pmin = Megawatts(pmin);
        self.pmax = Megawatts(pmax);
        self
    }

    /// Set current output (in MW)
    pub fn with_output(mut self, p_mw: f64) -> Self {
        self.active_power = Megawatts(p_mw);
        self
    }

    pub fn with_cost(mut self, cost: CostModel) -> Self {
        self.cost_model = cost;
        self
    }

    /// Hold the output at its current value
    pub fn fixed(mut self) -> Self {
        self.adjustable = false;
        self
    }

    pub fn out_of_service(mut self) -> Self {
        self.status = false;
        self
    }

    pub fn is_p_adjustable(&self) -> bool {
        self.status && self.adjustable
    }

    /// Output counted as a fixed injection (zero when out of service)
    pub fn fixed_injection(&self) -> Megawatts {
        if self.status {
            self.active_power
        } else {
            Megawatts(0.0)
        }
    }
}

#[derive(Debug, Clone)]
pub struct Load {
    pub id: LoadId,
    pub name: String,
    pub bus: BusId,
    /// Active power demand
    pub active_power: Megawatts,
}

impl Load {
    pub fn new(id: LoadId, name: impl Into<String>, bus: BusId, p_mw: f64) -> Self {
        Self {
            id,
            name: name.into(),
            bus,
            active_power: Megawatts(p_mw),
        }
    }
}

/// Line or transformer between two buses.
#[derive(Debug, Clone)]
pub struct Branch {
    pub id: BranchId,
    pub name: String,
    pub from_bus: BusId,
    pub to_bus: BusId,
    /// Series reactance (per-unit)
    pub reactance: f64,
    /// Phase shift applied from `from_bus` to `to_bus`
    pub phase_shift: Radians,
    /// Symmetric thermal rating; `None` means unlimited
    pub rating: Option<MegavoltAmperes>,
    /// Multiplier of the upper flow limit ($/h per p.u.)
    pub sens_flow_u_bound: f64,
    /// Multiplier of the lower flow limit ($/h per p.u.)
    pub sens_flow_l_bound: f64,
}

impl Default for Branch {
    fn default() -> Self {
        Self {
            id: BranchId(0),
            name: String::new(),
            from_bus: BusId(0),
            to_bus: BusId(0),
            reactance: 0.0,
            phase_shift: Radians::ZERO,
            rating: None,
            sens_flow_u_bound: 0.0,
            sens_flow_l_bound: 0.0,
        }
    }
}

impl Branch {
    pub fn new(
        id: BranchId,
        name: impl Into<String>,
        from_bus: BusId,
        to_bus: BusId,
        reactance: f64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            from_bus,
            to_bus,
            reactance,
            ..Self::default()
        }
    }

    /// Attach a symmetric thermal limit in MVA.
    pub fn with_rating(mut self, rating_mva: f64) -> Self {
        self.rating = Some(MegavoltAmperes(rating_mva));
        self
    }

    pub fn with_phase_shift(mut self, shift_rad: f64) -> Self {
        self.phase_shift = Radians(shift_rad);
        self
    }

    /// Series susceptance `1/x` (per-unit)
    pub fn susceptance(&self) -> Result<f64, NetworkError> {
        if self.reactance.abs() < 1e-12 {
            return Err(NetworkError::ZeroReactance(self.name.clone()));
        }
        Ok(1.0 / self.reactance)
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    Bus(Bus),
    Gen(Gen),
    Load(Load),
}

/// Multiplier blocks written back by [`Network::store_sensitivities`].
///
/// Bus entries follow [`Network::bus_nodes`] order, branch entries follow
/// [`Network::branch_edges`] order, variable entries follow the flagged
/// variable layout.
#[derive(Debug, Clone, Default)]
pub struct Sensitivities {
    pub bus_p_balance: Vec<f64>,
    pub branch_flow_upper: Vec<f64>,
    pub branch_flow_lower: Vec<f64>,
    pub var_upper: Vec<f64>,
    pub var_lower: Vec<f64>,
}

/// Snapshot of network-level quantities.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkProperties {
    pub num_buses: usize,
    pub num_branches: usize,
    pub num_gens: usize,
    pub num_loads: usize,
    pub num_vars: usize,
    pub total_load_mw: f64,
    pub total_gen_mw: f64,
    /// Total generation cost ($/h)
    pub gen_cost: f64,
    /// Largest amount by which a branch flow exceeds its rating (MW)
    pub max_flow_overload_mw: f64,
}

impl std::fmt::Display for NetworkProperties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} buses, {} branches, {} gens ({:.1} MW), {} loads ({:.1} MW), cost {:.2} $/h",
            self.num_buses,
            self.num_branches,
            self.num_gens,
            self.total_gen_mw,
            self.num_loads,
            self.total_load_mw,
            self.gen_cost
        )
    }
}

/// The power network graph plus its variable layout.
#[derive(Debug, Clone)]
pub struct Network {
    pub graph: Graph<Node, Branch, Undirected>,
    /// System base (MVA)
    pub base_power: f64,
    vars: VarRegistry,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    pub fn new() -> Self {
        Self {
            graph: Graph::new_undirected(),
            base_power: DEFAULT_BASE_POWER,
            vars: VarRegistry::default(),
        }
    }

    pub fn with_base_power(mut self, base_mva: f64) -> Self {
        self.base_power = base_mva;
        self
    }

    pub fn add_bus(&mut self, bus: Bus) -> NodeIndex {
        self.graph.add_node(Node::Bus(bus))
    }

    pub fn add_gen(&mut self, gen: Gen) -> NodeIndex {
        self.graph.add_node(Node::Gen(gen))
    }

    pub fn add_load(&mut self, load: Load) -> NodeIndex {
        self.graph.add_node(Node::Load(load))
    }

    /// Connect two existing buses.
    pub fn add_branch(&mut self, branch: Branch) -> NetworkResult<EdgeIndex> {
        let from = self.require_bus(&branch.name, branch.from_bus)?;
        let to = self.require_bus(&branch.name, branch.to_bus)?;
        Ok(self.graph.add_edge(from, to, branch))
    }

    pub fn bus_node(&self, id: BusId) -> Option<NodeIndex> {
        self.graph
            .node_indices()
            .find(|&n| matches!(&self.graph[n], Node::Bus(b) if b.id == id))
    }

    pub(crate) fn require_bus(&self, element: &str, id: BusId) -> NetworkResult<NodeIndex> {
        self.bus_node(id).ok_or_else(|| NetworkError::UnknownBus {
            element: element.to_string(),
            bus: id.value(),
        })
    }

    /// Bus nodes in graph order. This order numbers the power-balance rows.
    pub fn bus_nodes(&self) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|&n| matches!(self.graph[n], Node::Bus(_)))
            .collect()
    }

    pub fn gen_nodes(&self) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|&n| matches!(self.graph[n], Node::Gen(_)))
            .collect()
    }

    pub fn load_nodes(&self) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|&n| matches!(self.graph[n], Node::Load(_)))
            .collect()
    }

    /// Branch edges in graph order. This order numbers the flow-limit rows.
    pub fn branch_edges(&self) -> Vec<EdgeIndex> {
        self.graph.edge_indices().collect()
    }

    pub fn bus(&self, node: NodeIndex) -> Option<&Bus> {
        match self.graph.node_weight(node) {
            Some(Node::Bus(b)) => Some(b),
            _ => None,
        }
    }

    pub fn gen(&self, node: NodeIndex) -> Option<&Gen> {
        match self.graph.node_weight(node) {
            Some(Node::Gen(g)) => Some(g),
            _ => None,
        }
    }

    pub fn gen_mut(&mut self, node: NodeIndex) -> Option<&mut Gen> {
        match self.graph.node_weight_mut(node) {
            Some(Node::Gen(g)) => Some(g),
            _ => None,
        }
    }

    pub fn load_mut(&mut self, node: NodeIndex) -> Option<&mut Load> {
        match self.graph.node_weight_mut(node) {
            Some(Node::Load(l)) => Some(l),
            _ => None,
        }
    }

    /// Find a generator by name
    pub fn gen_by_name(&self, name: &str) -> Option<(NodeIndex, &Gen)> {
        self.graph.node_indices().find_map(|n| match &self.graph[n] {
            Node::Gen(g) if g.name == name => Some((n, g)),
            _ => None,
        })
    }

    pub fn buses(&self) -> Vec<&Bus> {
        self.graph
            .node_weights()
            .filter_map(|n| match n {
                Node::Bus(b) => Some(b),
                _ => None,
            })
            .collect()
    }

    pub fn generators(&self) -> Vec<&Gen> {
        self.graph
            .node_weights()
            .filter_map(|n| match n {
                Node::Gen(g) => Some(g),
                _ => None,
            })
            .collect()
    }

    pub fn loads(&self) -> Vec<&Load> {
        self.graph
            .node_weights()
            .filter_map(|n| match n {
                Node::Load(l) => Some(l),
                _ => None,
            })
            .collect()
    }

    pub fn branches(&self) -> Vec<&Branch> {
        self.graph.edge_weights().collect()
    }

    pub fn num_buses(&self) -> usize {
        self.buses().len()
    }

    pub fn num_branches(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn num_gens(&self) -> usize {
        self.generators().len()
    }

    pub fn num_loads(&self) -> usize {
        self.loads().len()
    }

    pub fn num_slack_buses(&self) -> usize {
        self.buses().iter().filter(|b| b.slack).count()
    }

    pub fn num_p_adjust_gens(&self) -> usize {
        self.generators()
            .iter()
            .filter(|g| g.is_p_adjustable())
            .count()
    }

    // ------------------------------------------------------------------
    // Variable flagging
    // ------------------------------------------------------------------

    /// Forget every flagged variable.
    pub fn clear_flags(&mut self) {
        self.vars.clear();
    }

    /// Flag `kind` on every component of `object` matching `selector`.
    ///
    /// Returns the number of newly created variables.
    pub fn set_flags(
        &mut self,
        object: ObjectType,
        flags: Flags,
        selector: Selector,
        kind: VarKind,
    ) -> NetworkResult<usize> {
        if kind.object_type() != object || selector.object_type() != object {
            return Err(NetworkError::FlagMismatch { object, kind });
        }

        let selected: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&n| match (&self.graph[n], selector) {
                (Node::Bus(_), Selector::AnyBus) => true,
                (Node::Bus(b), Selector::BusSlack) => b.slack,
                (Node::Bus(b), Selector::BusNotSlack) => !b.slack,
                (Node::Gen(_), Selector::AnyGen) => true,
                (Node::Gen(g), Selector::GenPAdjust) => g.is_p_adjustable(),
                _ => false,
            })
            .collect();

        let mut created = 0;
        for node in selected {
            if self.vars.apply(VarKey { kind, node }, flags) {
                created += 1;
            }
        }
        Ok(created)
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn num_bounded(&self) -> usize {
        self.vars.num_bounded()
    }

    pub fn vars(&self) -> &VarRegistry {
        &self.vars
    }

    pub fn var_index(&self, kind: VarKind, node: NodeIndex) -> Option<usize> {
        self.vars.index_of(VarKey { kind, node })
    }

    /// Current values of the flagged variables (angles in radians, generator
    /// outputs in per unit).
    pub fn var_values(&self) -> Vec<f64> {
        self.vars
            .entries()
            .iter()
            .map(|e| match (&self.graph[e.key.node], e.key.kind) {
                (Node::Bus(b), VarKind::BusAngle) => b.angle.value(),
                (Node::Gen(g), VarKind::GenActivePower) => {
                    g.active_power.to_per_unit(self.base_power)
                }
                _ => 0.0,
            })
            .collect()
    }

    /// Write variable values back into the components they were flagged on.
    pub fn set_var_values(&mut self, x: &[f64]) -> NetworkResult<()> {
        if x.len() != self.vars.len() {
            return Err(NetworkError::VarCount {
                expected: self.vars.len(),
                got: x.len(),
            });
        }
        let base = self.base_power;
        let entries = self.vars.entries().to_vec();
        for (entry, &value) in entries.iter().zip(x) {
            match (&mut self.graph[entry.key.node], entry.key.kind) {
                (Node::Bus(b), VarKind::BusAngle) => b.angle = Radians(value),
                (Node::Gen(g), VarKind::GenActivePower) => {
                    g.active_power = Megawatts::from_per_unit(value, base)
                }
                _ => {}
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Network quantities
    // ------------------------------------------------------------------

    pub fn total_load_mw(&self) -> f64 {
        self.loads().iter().map(|l| l.active_power.value()).sum()
    }

    pub fn total_generation_mw(&self) -> f64 {
        self.generators()
            .iter()
            .map(|g| g.fixed_injection().value())
            .sum()
    }

    /// Generation cost of in-service units at their current output ($/h)
    pub fn gen_cost(&self) -> f64 {
        self.generators()
            .iter()
            .filter(|g| g.status)
            .map(|g| g.cost_model.evaluate(g.active_power.value()))
            .sum()
    }

    /// DC branch flows (MW) in [`Network::branch_edges`] order, from the
    /// current bus angles.
    pub fn branch_flows_mw(&self) -> NetworkResult<Vec<f64>> {
        let angles: HashMap<BusId, f64> = self
            .buses()
            .iter()
            .map(|b| (b.id, b.angle.value()))
            .collect();

        self.graph
            .edge_weights()
            .map(|br| {
                let b = br.susceptance()?;
                let angle = |id: BusId| {
                    angles.get(&id).copied().ok_or(NetworkError::UnknownBus {
                        element: br.name.clone(),
                        bus: id.value(),
                    })
                };
                let dtheta = angle(br.from_bus)? - angle(br.to_bus)? - br.phase_shift.value();
                Ok(b * dtheta * self.base_power)
            })
            .collect()
    }

    pub fn properties(&self) -> NetworkProperties {
        let max_flow_overload_mw = self
            .branch_flows_mw()
            .map(|flows| {
                flows
                    .iter()
                    .zip(self.graph.edge_weights())
                    .filter_map(|(flow, br)| br.rating.map(|r| flow.abs() - r.value()))
                    .fold(0.0_f64, f64::max)
            })
            .unwrap_or(f64::NAN);

        NetworkProperties {
            num_buses: self.num_buses(),
            num_branches: self.num_branches(),
            num_gens: self.num_gens(),
            num_loads: self.num_loads(),
            num_vars: self.num_vars(),
            total_load_mw: self.total_load_mw(),
            total_gen_mw: self.total_generation_mw(),
            gen_cost: self.gen_cost(),
            max_flow_overload_mw,
        }
    }

    // ------------------------------------------------------------------
    // Sensitivities
    // ------------------------------------------------------------------

    pub fn clear_sensitivities(&mut self) {
        for node in self.graph.node_weights_mut() {
            match node {
                Node::Bus(b) => b.sens_p_balance = 0.0,
                Node::Gen(g) => {
                    g.sens_p_u_bound = 0.0;
                    g.sens_p_l_bound = 0.0;
                }
                Node::Load(_) => {}
            }
        }
        for br in self.graph.edge_weights_mut() {
            br.sens_flow_u_bound = 0.0;
            br.sens_flow_l_bound = 0.0;
        }
    }

    /// Store constraint multipliers on the components they belong to.
    pub fn store_sensitivities(&mut self, sens: &Sensitivities) -> NetworkResult<()> {
        let buses = self.bus_nodes();
        let edges = self.branch_edges();
        let nvars = self.vars.len();
        let check = |block: &'static str, got: usize, expected: usize| {
            if got == expected {
                Ok(())
            } else {
                Err(NetworkError::SensitivityShape {
                    block,
                    expected,
                    got,
                })
            }
        };
        check("bus_p_balance", sens.bus_p_balance.len(), buses.len())?;
        check("branch_flow_upper", sens.branch_flow_upper.len(), edges.len())?;
        check("branch_flow_lower", sens.branch_flow_lower.len(), edges.len())?;
        check("var_upper", sens.var_upper.len(), nvars)?;
        check("var_lower", sens.var_lower.len(), nvars)?;

        for (node, &lam) in buses.iter().zip(&sens.bus_p_balance) {
            if let Node::Bus(b) = &mut self.graph[*node] {
                b.sens_p_balance = lam;
            }
        }
        for (k, edge) in edges.iter().enumerate() {
            let br = &mut self.graph[*edge];
            br.sens_flow_u_bound = sens.branch_flow_upper[k];
            br.sens_flow_l_bound = sens.branch_flow_lower[k];
        }
        let entries = self.vars.entries().to_vec();
        for (j, entry) in entries.iter().enumerate() {
            if let (Node::Gen(g), VarKind::GenActivePower) =
                (&mut self.graph[entry.key.node], entry.key.kind)
            {
                g.sens_p_u_bound = sens.var_upper[j];
                g.sens_p_l_bound = sens.var_lower[j];
            }
        }
        Ok(())
    }

    pub(crate) fn check_base_power(&self) -> NetworkResult<()> {
        if self.base_power.is_finite() && self.base_power > 0.0 {
            Ok(())
        } else {
            Err(NetworkError::InvalidBasePower(self.base_power))
        }
    }

    /// Reject cost models the quadratic objective cannot represent.
    pub(crate) fn check_cost_models(&self) -> NetworkResult<()> {
        for g in self.generators() {
            if g.is_p_adjustable() && g.cost_model.quadratic_coefficients().is_none() {
                return Err(NetworkError::UnsupportedCost {
                    name: g.name.clone(),
                    degree: g.cost_model.degree(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_bus() -> Network {
        let mut net = Network::new();
        net.add_bus(Bus::new(BusId::new(1), "b1").as_slack());
        net.add_bus(Bus::new(BusId::new(2), "b2"));
        net.add_bus(Bus::new(BusId::new(3), "b3"));
        net.add_gen(Gen::new(GenId::new(1), "g1", BusId::new(1)).with_p_limits(0.0, 50.0));
        net.add_gen(Gen::new(GenId::new(2), "g2", BusId::new(2)).with_p_limits(0.0, 50.0));
        net.add_gen(
            Gen::new(GenId::new(3), "g3", BusId::new(3))
                .with_output(5.0)
                .fixed(),
        );
        net.add_load(Load::new(LoadId::new(1), "l3", BusId::new(3), 60.0));
        for (k, (f, t)) in [(1, 2), (2, 3), (1, 3)].into_iter().enumerate() {
            net.add_branch(
                Branch::new(BranchId::new(k), format!("{f}-{t}"), BusId::new(f), BusId::new(t), 0.1)
                    .with_rating(100.0),
            )
            .unwrap();
        }
        net
    }

    fn flag_dc(net: &mut Network) {
        net.clear_flags();
        net.set_flags(ObjectType::Bus, Flags::VARS, Selector::BusNotSlack, VarKind::BusAngle)
            .unwrap();
        net.set_flags(
            ObjectType::Gen,
            Flags::VARS | Flags::BOUNDED,
            Selector::GenPAdjust,
            VarKind::GenActivePower,
        )
        .unwrap();
    }

    #[test]
    fn test_counts() {
        let net = three_bus();
        assert_eq!(net.num_buses(), 3);
        assert_eq!(net.num_branches(), 3);
        assert_eq!(net.num_gens(), 3);
        assert_eq!(net.num_loads(), 1);
        assert_eq!(net.num_slack_buses(), 1);
        assert_eq!(net.num_p_adjust_gens(), 2);
    }

    #[test]
    fn test_flagging_layout() {
        let mut net = three_bus();
        flag_dc(&mut net);

        assert_eq!(net.num_vars(), 4);
        assert_eq!(net.num_bounded(), 2);

        let kinds: Vec<VarKind> = net.vars().entries().iter().map(|e| e.key.kind).collect();
        assert_eq!(
            kinds,
            vec![
                VarKind::BusAngle,
                VarKind::BusAngle,
                VarKind::GenActivePower,
                VarKind::GenActivePower
            ]
        );

        net.clear_flags();
        assert_eq!(net.num_vars(), 0);
    }

    #[test]
    fn test_flag_mismatch_rejected() {
        let mut net = three_bus();
        let err = net
            .set_flags(ObjectType::Gen, Flags::VARS, Selector::GenPAdjust, VarKind::BusAngle)
            .unwrap_err();
        assert!(matches!(err, NetworkError::FlagMismatch { .. }));

        let err = net
            .set_flags(ObjectType::Bus, Flags::VARS, Selector::GenPAdjust, VarKind::BusAngle)
            .unwrap_err();
        assert!(matches!(err, NetworkError::FlagMismatch { .. }));
    }

    #[test]
    fn test_var_values_round_trip_through_network() {
        let mut net = three_bus();
        flag_dc(&mut net);

        net.set_var_values(&[-0.1, -0.2, 0.3, 0.25]).unwrap();
        let b2 = net.bus(net.bus_node(BusId::new(2)).unwrap()).unwrap();
        assert!((b2.angle.value() + 0.1).abs() < 1e-12);
        let (_, g1) = net.gen_by_name("g1").unwrap();
        assert!((g1.active_power.value() - 30.0).abs() < 1e-9);

        let x = net.var_values();
        assert!((x[2] - 0.3).abs() < 1e-12);

        let err = net.set_var_values(&[0.0]).unwrap_err();
        assert_eq!(err, NetworkError::VarCount { expected: 4, got: 1 });
    }

    #[test]
    fn test_branch_flows_follow_angles() {
        let mut net = three_bus();
        flag_dc(&mut net);
        net.set_var_values(&[-0.1, -0.2, 0.0, 0.0]).unwrap();

        let flows = net.branch_flows_mw().unwrap();
        // (0 - (-0.1)) / 0.1 * 100 = 100 MW on 1-2
        assert!((flows[0] - 100.0).abs() < 1e-9);
        assert!((flows[1] - 100.0).abs() < 1e-9);
        assert!((flows[2] - 200.0).abs() < 1e-9);

        let props = net.properties();
        assert!((props.max_flow_overload_mw - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_bus_on_branch() {
        let mut net = three_bus();
        let err = net
            .add_branch(Branch::new(BranchId::new(9), "dangling", BusId::new(1), BusId::new(42), 0.1))
            .unwrap_err();
        assert_eq!(
            err,
            NetworkError::UnknownBus {
                element: "dangling".into(),
                bus: 42
            }
        );
    }

    #[test]
    fn test_properties_snapshot() {
        let net = three_bus();
        let props = net.properties();
        assert_eq!(props.num_buses, 3);
        assert_eq!(props.num_branches, 3);
        assert!((props.total_load_mw - 60.0).abs() < 1e-12);
        assert!((props.total_gen_mw - 5.0).abs() < 1e-12);

        let json = serde_json::to_value(&props).unwrap();
        assert_eq!(json["num_gens"], 3);
    }

    #[test]
    fn test_store_and_clear_sensitivities() {
        let mut net = three_bus();
        flag_dc(&mut net);

        let sens = Sensitivities {
            bus_p_balance: vec![10.0, 11.0, 12.0],
            branch_flow_upper: vec![0.0, 3.0, 0.0],
            branch_flow_lower: vec![0.0; 3],
            var_upper: vec![0.0, 0.0, 1.5, 0.0],
            var_lower: vec![0.0; 4],
        };
        net.store_sensitivities(&sens).unwrap();

        let lams: Vec<f64> = net.buses().iter().map(|b| b.sens_p_balance).collect();
        assert_eq!(lams, vec![10.0, 11.0, 12.0]);
        assert_eq!(net.branches()[1].sens_flow_u_bound, 3.0);
        assert_eq!(net.gen_by_name("g1").unwrap().1.sens_p_u_bound, 1.5);

        net.clear_sensitivities();
        assert!(net.buses().iter().all(|b| b.sens_p_balance == 0.0));

        let bad = Sensitivities {
            bus_p_balance: vec![0.0],
            ..sens
        };
        assert!(matches!(
            net.store_sensitivities(&bad),
            Err(NetworkError::SensitivityShape { block: "bus_p_balance", .. })
        ));
    }

    #[test]
    fn test_cost_model() {
        let cost = CostModel::quadratic(5.0, 20.0, 0.1);
        assert!((cost.evaluate(10.0) - (5.0 + 200.0 + 10.0)).abs() < 1e-12);
        assert!((cost.marginal_cost(10.0) - 22.0).abs() < 1e-12);
        assert_eq!(cost.quadratic_coefficients(), Some((5.0, 20.0, 0.1)));

        let cubic = CostModel::Polynomial(vec![0.0, 1.0, 0.0, 2.0]);
        assert_eq!(cubic.quadratic_coefficients(), None);
        assert_eq!(cubic.degree(), 3);

        let padded = CostModel::Polynomial(vec![0.0, 1.0, 0.0, 0.0]);
        assert_eq!(padded.quadratic_coefficients(), Some((0.0, 1.0, 0.0)));
    }
}
