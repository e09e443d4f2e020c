use crate::params::CellTypeParameters;

/// Immutable integration constants for one membrane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MembraneParameters {
    pub voltage_decay: f64,
    pub current_decay: f64,
    pub calcium_decay: f64,
    pub max_voltage: f64,
    pub voltage_reset: f64,
    pub calcium_increment: f64,
    /// Input current is forced to this value on firing, if set.
    pub reset_input_current: Option<f64>,
    pub step_size: f64,
}

impl MembraneParameters {
    pub fn new(p: &CellTypeParameters, step_size: f64) -> Self {
        Self {
            voltage_decay: p.voltage_decay,
            current_decay: p.current_decay,
            calcium_decay: p.calcium_decay,
            max_voltage: p.max_voltage,
            voltage_reset: p.voltage_reset,
            calcium_increment: p.calcium_increment,
            reset_input_current: p.reset_input_current.then_some(p.input_current_reset),
            step_size,
        }
    }
}

/// Leaky integrate-and-fire state of a single cell.
///
/// Voltage and input current both relax toward zero. Calcium jumps on every
/// spike and decays afterwards, so it doubles as a short trace of recent
/// firing that the synapses read for STDP.
#[derive(Debug, Clone)]
pub struct Membrane {
    voltage: f64,
    input_current: f64,
    calcium: f64,
    fired: bool,
    active: bool,
    params: MembraneParameters,
}

impl Membrane {
    pub fn new(p: &CellTypeParameters, step_size: f64) -> Self {
        Self {
            voltage: p.starting_membrane_voltage,
            input_current: p.starting_input_current,
            calcium: p.starting_calcium,
            fired: false,
            active: true,
            params: MembraneParameters::new(p, step_size),
        }
    }

    pub fn voltage(&self) -> f64 {
        self.voltage
    }

    pub fn input_current(&self) -> f64 {
        self.input_current
    }

    pub fn calcium(&self) -> f64 {
        self.calcium
    }

    pub fn fired(&self) -> bool {
        self.fired
    }

    /// False once the voltage is non-positive or no longer rising.
    pub fn active(&self) -> bool {
        self.active
    }

    pub fn params(&self) -> &MembraneParameters {
        &self.params
    }

    /// Accumulate into the input current. No bound check.
    #[inline]
    pub fn receive_input(&mut self, current: f64) {
        self.input_current += current;
    }

    /// Advance one step. Returns whether the cell fired.
    ///
    /// The threshold test uses the voltage left by the previous step, before
    /// this step's decay and integration.
    pub fn update(&mut self) -> bool {
        let p = self.params;
        let voltage_before_update = self.voltage;

        if self.voltage > p.max_voltage {
            self.fired = true;
            self.voltage = p.voltage_reset;
            self.calcium += p.calcium_increment;
            if let Some(reset) = p.reset_input_current {
                self.input_current = reset;
            }
        } else {
            self.fired = false;
        }

        self.voltage = self.voltage * (1.0 - p.voltage_decay).powf(p.step_size)
            + self.input_current * p.step_size;
        self.input_current *= (1.0 - p.current_decay).powf(p.step_size);
        self.calcium *= (1.0 - p.calcium_decay).powf(p.step_size);

        self.active = !(self.voltage <= 0.0 || voltage_before_update >= self.voltage);
        self.fired
    }

    /// Closed-form equivalent of `steps` consecutive [`update`](Self::update) calls.
    ///
    /// Precondition: no input arrives and the cell does not fire during the
    /// interval. This is not checked; violating it gives numerically wrong
    /// (but finite) state.
    ///
    /// The residual input current is integrated exactly:
    /// `v_n = a^n v_0 + h i_0 sum_{k<n} a^(n-1-k) b^k` with per-step factors
    /// `a = (1-voltage_decay)^h` and `b = (1-current_decay)^h`.
    pub fn warp(&mut self, steps: u64) {
        self.active = true;
        if steps == 0 {
            return;
        }
        let p = self.params;
        let n = steps as f64;
        let a = (1.0 - p.voltage_decay).powf(p.step_size);
        let b = (1.0 - p.current_decay).powf(p.step_size);
        let a_n = a.powf(n);
        let b_n = b.powf(n);

        let drive = if self.input_current == 0.0 {
            0.0
        } else {
            self.input_current * p.step_size * geometric_cross_sum(a, b, a_n, b_n, n)
        };

        self.voltage = self.voltage * a_n + drive;
        self.input_current *= b_n;
        self.calcium *= (1.0 - p.calcium_decay).powf(p.step_size * n);
    }
}

// sum_{k=0}^{n-1} a^(n-1-k) b^k
fn geometric_cross_sum(a: f64, b: f64, a_n: f64, b_n: f64, n: f64) -> f64 {
    let scale = a.abs().max(b.abs());
    if scale == 0.0 {
        // Only the k = n-1 = 0 term survives (0^0 = 1).
        return if n == 1.0 { 1.0 } else { 0.0 };
    }
    if (a - b).abs() <= 1e-12 * scale {
        n * a.powf(n - 1.0)
    } else {
        (a_n - b_n) / (a - b)
    }
}
