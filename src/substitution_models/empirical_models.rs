//! Empirical amino-acid rate tables. Every table stores the exchangeability of states j < i in
//! row i (a lower triangle) and the states in the order of [`AMINO_ACIDS`].

use std::fmt::Display;
use std::str::FromStr;

use anyhow::bail;

use crate::errors::ModelError;
use crate::rate_layout::RateLayout;
use crate::substitution_models::{FreqVector, RateMatrix, RateMatrixBuilder};
use crate::Result;

pub const AMINO_ACIDS: &str = "ACDEFGHIKLMNPQRSTVWY";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EmpiricalModel {
    /// Influenza
    Flu,
    /// HIV between-host
    Hivb,
    /// HIV within-host
    Hivw,
}

impl FromStr for EmpiricalModel {
    type Err = anyhow::Error;

    fn from_str(name: &str) -> Result<Self> {
        match name.to_uppercase().as_str() {
            "FLU" => Ok(EmpiricalModel::Flu),
            "HIVB" => Ok(EmpiricalModel::Hivb),
            "HIVW" => Ok(EmpiricalModel::Hivw),
            _ => bail!(ModelError::InvalidParameter(format!(
                "Unknown empirical model '{}', expected FLU, HIVB or HIVW",
                name
            ))),
        }
    }
}

impl Display for EmpiricalModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmpiricalModel::Flu => write!(f, "FLU"),
            EmpiricalModel::Hivb => write!(f, "HIVB"),
            EmpiricalModel::Hivw => write!(f, "HIVW"),
        }
    }
}

impl EmpiricalModel {
    fn tables(&self) -> (&'static [f64; 190], &'static [f64; 20]) {
        match self {
            EmpiricalModel::Flu => (&FLU_RATES, &FLU_FREQS),
            EmpiricalModel::Hivb => (&HIVB_RATES, &HIVB_FREQS),
            EmpiricalModel::Hivw => (&HIVW_RATES, &HIVW_FREQS),
        }
    }

    /// Exchangeabilities in symmetric layout order, normalised to sum up to 1. Ready for
    /// [`crate::svs::InformedBernoulli`] and the symmetric [`RateMatrixBuilder`].
    ///
    /// # Example
    /// ```
    /// use phylo_ctmc::substitution_models::EmpiricalModel;
    /// let rates = EmpiricalModel::Hivb.rates();
    /// assert_eq!(rates.len(), 190);
    /// assert!((rates.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    /// ```
    pub fn rates(&self) -> Vec<f64> {
        let (table, _) = self.tables();
        let rates: Vec<f64> = RateLayout::Symmetric
            .cells(AMINO_ACIDS.len())
            .map(|(_, (i, j))| table[j * (j - 1) / 2 + i])
            .collect();
        let total: f64 = rates.iter().sum();
        rates.iter().map(|r| r / total).collect()
    }

    /// Stationary frequencies, normalised to sum up to 1.
    pub fn freqs(&self) -> FreqVector {
        let (_, freqs) = self.tables();
        let freqs = FreqVector::from_column_slice(freqs);
        let total = freqs.sum();
        freqs / total
    }

    /// The time-reversible rate matrix of the model.
    pub fn rate_matrix(&self) -> Result<RateMatrix> {
        RateMatrixBuilder::new(&self.rates())
            .frequencies(self.freqs().as_slice())
            .symmetric(true)
            .build()
    }
}

const FLU_RATES: [f64; 190] = [
    0.026447095,
    0.584852306, 0.014100000,
    1.484234503, 0.000000000, 5.370511279,
    0.080490909, 0.104053666, 0.000001060, 0.001003501,
    1.132313122, 0.116941459, 1.934832784, 1.593098825, 0.001236645,
    0.214757862, 0.021800000, 0.887570549, 0.256491863, 0.119028506, 0.058774527,
    0.149926734, 0.001112158, 0.014085917, 0.014200000, 1.463357278, 0.000016300, 0.243190142,
    0.474333610, 0.000003830, 0.290042980, 3.881488809, 0.320000000, 0.264148929, 0.347302791,
    0.227707997,
    0.023116952, 0.005613627, 0.005730682, 0.016499536, 2.986800036, 0.006516229, 0.321611694,
    3.512072282, 0.129223639,
    0.058745423, 0.111457310, 0.041762964, 0.313974351, 0.279910509, 0.001500467, 0.001273509,
    9.017954203, 1.331291619, 6.746936485,
    0.053366579, 0.000013000, 7.737392871, 0.061652192, 0.000836000, 0.322524648, 1.387096032,
    0.218571975, 2.646847965, 0.000836000, 0.005251688,
    0.659311478, 0.000000000, 0.188539456, 0.319558828, 0.007132430, 0.038631761, 0.924466914,
    0.080543327, 0.195750632, 0.634308521, 0.056900000, 0.036400000,
    0.353753982, 0.002547334, 0.145469388, 1.195629122, 0.032680657, 0.108051341, 5.330313412,
    0.028839950, 2.559587177, 1.020366955, 0.190259181, 0.530642655, 0.712769599,
    0.138658765, 0.167207008, 0.006771843, 0.124897617, 0.016100000, 1.190624465, 1.879569938,
    0.246117172, 15.30009662, 0.296045557, 0.890162346, 0.161000889, 0.154027180, 3.292716942,
    3.011344519, 0.336263345, 0.338372183, 0.307140298, 0.996685670, 1.585646577, 0.580704250,
    0.290381075, 0.283807672, 0.570766693, 0.007026588, 3.881310531, 2.087385344, 0.487822499,
    0.950138410,
    5.418298175, 0.011975266, 0.135481233, 0.280124895, 0.000134906, 0.018808030, 0.368713573,
    2.904052286, 1.526964200, 0.044926357, 2.031511321, 2.140332316, 0.542251094, 0.602340963,
    0.183076905, 2.206859934,
    3.532005270, 0.054904564, 0.297123975, 0.285047948, 0.592587985, 0.337229619, 0.098631355,
    14.39405219, 0.073127930, 0.890598579, 4.904842235, 0.010257517, 0.058971975, 0.406697814,
    0.103964386, 0.088256423, 0.654109108,
    0.196000000, 0.094106680, 0.000014900, 0.155245492, 0.814753094, 0.196486447, 0.022400000,
    0.032132150, 0.000049800, 0.431277663, 0.070460039, 0.000536000, 0.000431021, 0.044000000,
    1.369429408, 0.099835753, 0.207066206, 0.256900461,
    0.018289288, 0.601692431, 0.525398543, 0.104092870, 5.393924245, 0.074814997, 6.448954446,
    0.273934263, 0.012416222, 0.340058468, 0.874272175, 0.373101927, 0.000182000, 0.072205935,
    0.099855497, 0.392552240, 0.124898020, 0.167581647, 0.42775543,
];

const FLU_FREQS: [f64; 20] = [
    0.04707195, 0.02502197, 0.04785995, 0.05458695, 0.03049597,
    0.07637292, 0.01996398, 0.06713393, 0.05678494, 0.07149793,
    0.01815098, 0.07421393, 0.05065595, 0.03330397, 0.05090995,
    0.08840891, 0.07433893, 0.06322894, 0.01852398, 0.03147397,
];

const HIVB_RATES: [f64; 190] = [
    0.123758000,
    1.455040000, 0.005000000,
    1.481350000, 0.005000000, 10.58720000,
    0.014126900, 9.298150000, 0.005000000, 0.005000000,
    2.135360000, 0.897871000, 2.838060000, 3.927750000, 0.291561000,
    0.084761300, 0.240073000, 1.916900000, 0.119740000, 0.145558000, 0.005000000,
    0.005000000, 0.005000000, 0.017679200, 0.006090790, 3.398360000, 0.005000000, 0.103111000,
    0.005000000, 0.005000000, 0.005000000, 4.614820000, 0.034265800, 0.521705000, 0.005000000,
    0.322319000,
    0.215256000, 0.129777000, 0.008760480, 0.005000000, 8.524840000, 0.005000000, 1.741710000,
    5.958790000, 0.081499500,
    0.018664300, 0.005000000, 0.005000000, 0.175789000, 0.188025000, 0.005000000, 0.005000000,
    11.20650000, 1.282460000, 5.319610000,
    0.005000000, 0.086064200, 17.66120000, 0.079263300, 0.005000000, 0.323401000, 7.645850000,
    0.680565000, 7.904430000, 0.005000000, 0.005000000,
    2.122170000, 0.005000000, 0.034265800, 0.012022600, 0.005000000, 0.005000000, 2.453180000,
    0.041059300, 0.031386200, 2.077570000, 0.005000000, 0.007395780,
    0.055112800, 0.005000000, 0.005000000, 2.560200000, 0.005000000, 0.061913700, 7.055450000,
    0.005000000, 6.547370000, 1.494560000, 0.303676000, 0.672052000, 4.472110000,
    0.307507000, 0.351721000, 0.005000000, 0.074921800, 0.005000000, 3.653450000, 9.040440000,
    0.677289000, 20.45000000, 0.701427000, 2.513940000, 0.295543000, 1.283550000, 3.421500000,
    2.466330000, 4.693140000, 0.528230000, 0.005000000, 0.956472000, 4.380410000, 0.382747000,
    1.218030000, 0.504111000, 0.927656000, 0.005000000, 13.14470000, 5.377620000, 0.116311000,
    3.479100000,
    15.91830000, 0.739969000, 0.274724000, 0.289774000, 0.014126900, 0.369615000, 0.711594000,
    8.612170000, 4.671420000, 0.043767300, 4.940260000, 6.886670000, 2.014170000, 0.243589000,
    2.868680000, 8.931070000,
    7.614280000, 0.420027000, 1.047930000, 1.028470000, 0.723274000, 0.953155000, 0.005000000,
    17.73890000, 0.265829000, 1.410360000, 6.853200000, 0.026656000, 0.005000000, 0.020915300,
    0.081245400, 0.074921800, 0.709226000,
    0.005000000, 2.632770000, 0.005000000, 0.005000000, 0.829343000, 1.216740000, 0.069517900,
    0.005000000, 0.005000000, 0.748843000, 0.089078000, 0.005000000, 0.044450600, 0.026656000,
    0.991338000, 0.024872800, 0.005000000, 0.005000000,
    0.005000000, 7.579320000, 0.674653000, 0.079263300, 15.34000000, 0.005000000, 18.69430000,
    0.148168000, 0.005000000, 0.111986000, 0.005000000, 1.764170000, 0.030438100, 0.113033000,
    0.009918260, 0.648024000, 0.105652000, 0.041059300, 1.280220000,
];

const HIVB_FREQS: [f64; 20] = [
    0.060490222, 0.020075899, 0.042109048, 0.071567447, 0.028809447,
    0.072308239, 0.022293943, 0.069730629, 0.056968211, 0.098851122,
    0.019768318, 0.044127815, 0.046025282, 0.053606488, 0.066039665,
    0.050604330, 0.053636813, 0.061625237, 0.033011601, 0.028350243,
];

const HIVW_RATES: [f64; 190] = [
    0.167653000,
    4.435210000, 0.005000000,
    5.563250000, 0.005000000, 12.12330000,
    0.597923000, 0.362959000, 0.005000000, 0.005000000,
    1.868500000, 0.048979800, 10.39690000, 14.78010000, 0.005000000,
    0.005000000, 0.005000000, 2.317790000, 0.005000000, 0.005000000, 0.005000000,
    0.005000000, 0.005000000, 0.145124000, 0.039051200, 1.482880000, 0.005000000, 0.005000000,
    0.592784000, 0.005000000, 0.894313000, 23.96260000, 0.005000000, 0.279425000, 0.224060000,
    0.817481000,
    0.160240000, 0.005000000, 0.005000000, 0.129839000, 7.487810000, 0.048979800, 1.763820000,
    9.102460000, 0.005000000,
    0.005000000, 0.005000000, 0.005000000, 0.005000000, 0.005000000, 0.048979800, 0.005000000,
    17.30640000, 4.095640000, 11.38390000,
    0.617509000, 0.060493200, 29.40870000, 0.201526000, 0.005000000, 0.060493200, 8.598760000,
    0.987028000, 10.66550000, 0.005000000, 0.201526000,
    1.009810000, 0.005000000, 0.005000000, 0.005000000, 0.034225200, 0.005000000, 13.94440000,
    0.005000000, 0.111928000, 9.830950000, 0.005000000, 0.344848000,
    0.005000000, 0.005000000, 0.005000000, 3.206560000, 0.005000000, 0.060493200, 18.54650000,
    0.034225200, 13.07050000, 2.890480000, 0.005000000, 0.342068000, 3.045020000,
    0.074480800, 2.863640000, 0.067453900, 0.025163200, 0.005000000, 13.43790000, 6.844050000,
    1.340690000, 39.88970000, 0.586757000, 3.286520000, 0.160240000, 0.404723000, 10.67460000,
    8.594200000, 1.121950000, 0.427881000, 0.005000000, 4.279390000, 6.279660000, 0.725157000,
    0.740091000, 0.005000000, 6.143960000, 0.392575000, 14.56990000, 14.24900000, 0.160240000,
    8.350240000,
    24.14220000, 0.005000000, 0.630395000, 0.458743000, 0.114512000, 0.048979800, 0.959560000,
    9.363450000, 4.048020000, 0.005000000, 7.413130000, 4.542060000, 4.337010000, 0.203091000,
    0.928203000, 6.340790000,
    24.80940000, 0.005000000, 2.917860000, 2.199520000, 2.280000000, 2.796220000, 0.827479000,
    24.82310000, 0.128065000, 2.953440000, 14.76830000, 0.074480800, 0.005000000, 0.005000000,
    0.279425000, 0.862637000, 0.005000000,
    0.005000000, 5.498940000, 0.005000000, 0.005000000, 0.005000000, 2.825800000, 0.005000000,
    0.005000000, 0.005000000, 1.370310000, 0.005000000, 0.005000000, 0.005000000, 0.044329800,
    5.965640000, 1.101560000, 0.005000000, 0.005000000,
    0.005000000, 8.348350000, 2.281540000, 0.005000000, 4.127280000, 0.005000000, 47.48890000,
    0.114512000, 0.005000000, 0.005000000, 0.579198000, 5.064750000, 0.005000000, 0.005000000,
    0.005000000, 0.933142000, 0.490608000, 1.354820000, 0.005000000,
];

const HIVW_FREQS: [f64; 20] = [
    0.0377494, 0.0240105, 0.0342034, 0.0618606, 0.0422741,
    0.0838496, 0.0156076, 0.0983641, 0.0641682, 0.0577867,
    0.0158419, 0.0891129, 0.0458601, 0.0437824, 0.0573210,
    0.0550846, 0.0813774, 0.0515638, 0.0195970, 0.0205847,
];
