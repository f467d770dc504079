//! Optimization problem blocks built over the flagged variables of a network.
//!
//! A [`Problem`] collects constraint and function kinds, then [`Problem::analyze`]
//! turns them into sparse blocks for the current network state:
//!
//! - equality rows `A x = b`
//! - general rows `l <= G x <= u`
//! - an objective `phi(x)` with gradient `gphi` and lower-triangular Hessian `hphi`
//!
//! All power quantities are per unit on the network base; angles are radians.

use std::collections::HashMap;
use std::fmt;

use petgraph::graph::NodeIndex;
use sprs::{CsMat, TriMat};

use crate::error::{NetworkError, NetworkResult};
use crate::flags::VarKind;
use crate::{BusId, Network, Node};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// Linearized power balance, one equality row per bus
    DcPowerBalance,
    /// Branch flow limits, one row per branch
    DcFlowLimit,
    /// Box bounds on the variables themselves
    VariableBounds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// Generation cost of P-adjustable generators
    GenCost,
}

/// Blocks of one constraint. Unused blocks have zero rows.
#[derive(Debug, Clone)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub a: CsMat<f64>,
    pub b: Vec<f64>,
    pub g: CsMat<f64>,
    pub l: Vec<f64>,
    pub u: Vec<f64>,
}

impl Constraint {
    fn empty(kind: ConstraintKind, nx: usize) -> Self {
        Self {
            kind,
            a: CsMat::zero((0, nx)),
            b: Vec::new(),
            g: CsMat::zero((0, nx)),
            l: Vec::new(),
            u: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub kind: FunctionKind,
    pub weight: f64,
}

/// Per-variable quadratic cost `c1*P + c2*P^2` already converted to per unit.
#[derive(Debug, Clone, Copy)]
struct CostTerm {
    var: usize,
    linear: f64,
    quadratic: f64,
}

#[derive(Debug, Clone)]
pub struct Problem {
    constraints: Vec<Constraint>,
    functions: Vec<Function>,
    cost_terms: Vec<CostTerm>,
    x0: Vec<f64>,
    num_buses: usize,
    num_branches: usize,
    analyzed: bool,
    /// Stacked equality matrix of all constraints
    pub a: CsMat<f64>,
    /// Stacked equality right-hand side
    pub b: Vec<f64>,
    /// Objective value at the last evaluated point
    pub phi: f64,
    /// Objective gradient at the last evaluated point
    pub gphi: Vec<f64>,
    /// Lower triangle of the objective Hessian
    pub hphi: CsMat<f64>,
}

impl Default for Problem {
    fn default() -> Self {
        Self::new()
    }
}

impl Problem {
    pub fn new() -> Self {
        Self {
            constraints: Vec::new(),
            functions: Vec::new(),
            cost_terms: Vec::new(),
            x0: Vec::new(),
            num_buses: 0,
            num_branches: 0,
            analyzed: false,
            a: CsMat::zero((0, 0)),
            b: Vec::new(),
            phi: 0.0,
            gphi: Vec::new(),
            hphi: CsMat::zero((0, 0)),
        }
    }

    pub fn add_constraint(&mut self, kind: ConstraintKind) {
        self.constraints.push(Constraint::empty(kind, 0));
        self.analyzed = false;
    }

    pub fn add_function(&mut self, kind: FunctionKind, weight: f64) {
        self.functions.push(Function { kind, weight });
        self.analyzed = false;
    }

    /// Build all blocks for the network's current state and flagged variables.
    pub fn analyze(&mut self, net: &Network) -> NetworkResult<()> {
        net.check_base_power()?;
        net.check_cost_models()?;

        let nx = net.num_vars();
        let layout = Layout::new(net)?;

        for constraint in &mut self.constraints {
            *constraint = match constraint.kind {
                ConstraintKind::DcPowerBalance => power_balance(net, &layout)?,
                ConstraintKind::DcFlowLimit => flow_limits(net, &layout)?,
                ConstraintKind::VariableBounds => variable_bounds(net),
            };
        }

        self.cost_terms = cost_terms(net);
        self.x0 = net.var_values();
        self.num_buses = layout.bus_rows.len();
        self.num_branches = net.num_branches();

        let (a, b) = stack_equalities(&self.constraints, nx);
        self.a = a;
        self.b = b;
        self.phi = 0.0;
        self.gphi = vec![0.0; nx];
        self.hphi = CsMat::zero((nx, nx));
        self.analyzed = true;
        Ok(())
    }

    /// Current values of the variables at analysis time.
    pub fn init_point(&self) -> &[f64] {
        &self.x0
    }

    /// Evaluate the objective functions at `x`.
    pub fn eval(&mut self, x: &[f64]) -> NetworkResult<()> {
        if !self.analyzed {
            return Err(NetworkError::NotAnalyzed);
        }
        let nx = self.x0.len();
        if x.len() != nx {
            return Err(NetworkError::VarCount {
                expected: nx,
                got: x.len(),
            });
        }

        let mut phi = 0.0;
        let mut gphi = vec![0.0; nx];
        let mut hphi = TriMat::new((nx, nx));
        for func in &self.functions {
            match func.kind {
                FunctionKind::GenCost => {
                    for term in &self.cost_terms {
                        let xj = x[term.var];
                        phi += func.weight * (term.linear * xj + term.quadratic * xj * xj);
                        gphi[term.var] += func.weight * (term.linear + 2.0 * term.quadratic * xj);
                        if term.quadratic != 0.0 {
                            hphi.add_triplet(term.var, term.var, func.weight * 2.0 * term.quadratic);
                        }
                    }
                }
            }
        }

        self.phi = phi;
        self.gphi = gphi;
        self.hphi = hphi.to_csc();
        Ok(())
    }

    pub fn find_constraint(&self, kind: ConstraintKind) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.kind == kind)
    }

    pub fn num_vars(&self) -> usize {
        self.x0.len()
    }

    pub fn num_buses(&self) -> usize {
        self.num_buses
    }

    pub fn num_branches(&self) -> usize {
        self.num_branches
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Problem")?;
        writeln!(f, "  variables:   {}", self.num_vars())?;
        writeln!(f, "  buses:       {}", self.num_buses)?;
        writeln!(f, "  branches:    {}", self.num_branches)?;
        writeln!(f, "  equalities:  {}", self.b.len())?;
        writeln!(f, "  functions:")?;
        for func in &self.functions {
            writeln!(f, "    {:?} (weight {})", func.kind, func.weight)?;
        }
        write!(f, "  constraints:")?;
        for c in &self.constraints {
            write!(
                f,
                "\n    {:?}: A {}x{}, G {}x{}",
                c.kind,
                c.a.rows(),
                c.a.cols(),
                c.g.rows(),
                c.g.cols()
            )?;
        }
        Ok(())
    }
}

/// Bus rows and angle lookups shared by the network constraints.
struct Layout {
    bus_rows: HashMap<BusId, usize>,
    bus_nodes: HashMap<BusId, NodeIndex>,
}

impl Layout {
    fn new(net: &Network) -> NetworkResult<Self> {
        let mut bus_rows = HashMap::new();
        let mut bus_nodes = HashMap::new();
        for (row, node) in net.bus_nodes().into_iter().enumerate() {
            if let Node::Bus(bus) = &net.graph[node] {
                if bus_rows.insert(bus.id, row).is_some() {
                    return Err(NetworkError::DuplicateBus(bus.id.value()));
                }
                bus_nodes.insert(bus.id, node);
            }
        }
        Ok(Self {
            bus_rows,
            bus_nodes,
        })
    }

    fn row(&self, element: &str, bus: BusId) -> NetworkResult<usize> {
        self.bus_rows
            .get(&bus)
            .copied()
            .ok_or_else(|| NetworkError::UnknownBus {
                element: element.to_string(),
                bus: bus.value(),
            })
    }

    /// Angle variable column, or the fixed angle value when the bus angle is not a variable.
    fn angle(&self, net: &Network, element: &str, bus: BusId) -> NetworkResult<AngleTerm> {
        let node = self
            .bus_nodes
            .get(&bus)
            .copied()
            .ok_or_else(|| NetworkError::UnknownBus {
                element: element.to_string(),
                bus: bus.value(),
            })?;
        if let Some(j) = net.var_index(VarKind::BusAngle, node) {
            return Ok(AngleTerm::Var(j));
        }
        let value = net.bus(node).map(|b| b.angle.value()).unwrap_or(0.0);
        Ok(AngleTerm::Fixed(value))
    }
}

enum AngleTerm {
    Var(usize),
    Fixed(f64),
}

fn power_balance(net: &Network, layout: &Layout) -> NetworkResult<Constraint> {
    let nx = net.num_vars();
    let nbus = layout.bus_rows.len();
    let base = net.base_power;
    let mut a = TriMat::new((nbus, nx));
    let mut b = vec![0.0; nbus];

    for br in net.branches() {
        let bk = br.susceptance()?;
        let f = layout.row(&br.name, br.from_bus)?;
        let t = layout.row(&br.name, br.to_bus)?;
        let theta_f = layout.angle(net, &br.name, br.from_bus)?;
        let theta_t = layout.angle(net, &br.name, br.to_bus)?;

        // flow = bk*(theta_f - theta_t - shift), leaving f and entering t
        for (row, sign) in [(f, -1.0), (t, 1.0)] {
            for (theta, coef) in [(&theta_f, bk), (&theta_t, -bk)] {
                match theta {
                    AngleTerm::Var(j) => a.add_triplet(row, *j, sign * coef),
                    AngleTerm::Fixed(value) => b[row] -= sign * coef * value,
                }
            }
            b[row] += sign * bk * br.phase_shift.value();
        }
    }

    for node in net.gen_nodes() {
        let Some(gen) = net.gen(node) else { continue };
        let row = layout.row(&gen.name, gen.bus)?;
        match net.var_index(VarKind::GenActivePower, node) {
            Some(j) => a.add_triplet(row, j, 1.0),
            None => b[row] -= gen.fixed_injection().to_per_unit(base),
        }
    }

    for load in net.loads() {
        let row = layout.row(&load.name, load.bus)?;
        b[row] += load.active_power.to_per_unit(base);
    }

    Ok(Constraint {
        a: a.to_csc(),
        b,
        ..Constraint::empty(ConstraintKind::DcPowerBalance, nx)
    })
}

fn flow_limits(net: &Network, layout: &Layout) -> NetworkResult<Constraint> {
    let nx = net.num_vars();
    let nbr = net.num_branches();
    let base = net.base_power;
    let mut g = TriMat::new((nbr, nx));
    let mut l = Vec::with_capacity(nbr);
    let mut u = Vec::with_capacity(nbr);

    for (k, br) in net.branches().into_iter().enumerate() {
        let bk = br.susceptance()?;
        let mut constant = -bk * br.phase_shift.value();
        for (bus, coef) in [(br.from_bus, bk), (br.to_bus, -bk)] {
            match layout.angle(net, &br.name, bus)? {
                AngleTerm::Var(j) => g.add_triplet(k, j, coef),
                AngleTerm::Fixed(value) => constant += coef * value,
            }
        }
        let limit = br
            .rating
            .map(|r| r.to_per_unit(base))
            .unwrap_or(f64::INFINITY);
        l.push(-limit - constant);
        u.push(limit - constant);
    }

    Ok(Constraint {
        g: g.to_csc(),
        l,
        u,
        ..Constraint::empty(ConstraintKind::DcFlowLimit, nx)
    })
}

fn variable_bounds(net: &Network) -> Constraint {
    let nx = net.num_vars();
    let base = net.base_power;
    let mut l = vec![f64::NEG_INFINITY; nx];
    let mut u = vec![f64::INFINITY; nx];

    for (j, entry) in net.vars().entries().iter().enumerate() {
        if !entry.bounded {
            continue;
        }
        if let (Node::Gen(gen), VarKind::GenActivePower) = (&net.graph[entry.key.node], entry.key.kind)
        {
            l[j] = gen.pmin.to_per_unit(base);
            u[j] = gen.pmax.to_per_unit(base);
        }
    }

    Constraint {
        g: CsMat::eye(nx),
        l,
        u,
        ..Constraint::empty(ConstraintKind::VariableBounds, nx)
    }
}

fn cost_terms(net: &Network) -> Vec<CostTerm> {
    let base = net.base_power;
    net.vars()
        .entries()
        .iter()
        .enumerate()
        .filter_map(|(var, entry)| match (&net.graph[entry.key.node], entry.key.kind) {
            (Node::Gen(gen), VarKind::GenActivePower) => {
                let (_, c1, c2) = gen.cost_model.quadratic_coefficients()?;
                Some(CostTerm {
                    var,
                    linear: c1 * base,
                    quadratic: c2 * base * base,
                })
            }
            _ => None,
        })
        .collect()
}

fn stack_equalities(constraints: &[Constraint], nx: usize) -> (CsMat<f64>, Vec<f64>) {
    let rows: usize = constraints.iter().map(|c| c.b.len()).sum();
    let mut a = TriMat::new((rows, nx));
    let mut b = Vec::with_capacity(rows);
    let mut offset = 0;
    for c in constraints {
        for (&v, (i, j)) in c.a.iter() {
            a.add_triplet(offset + i, j, v);
        }
        b.extend_from_slice(&c.b);
        offset += c.b.len();
    }
    (a.to_csc(), b)
}
